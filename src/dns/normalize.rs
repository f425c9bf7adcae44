use std::net::Ipv4Addr;

use crate::error::MalformedRecordError;
use crate::models::{DnsFact, RawDnsRecord, RecordType};
use crate::utils::{canonical_name, is_valid_hostname, qualify_name, reverse_name_to_ipv4};

/// Validate a raw A or PTR record and convert it into a canonical DnsFact
pub fn normalize_record(raw: &RawDnsRecord) -> Result<DnsFact, MalformedRecordError> {
    if raw.name.trim().is_empty() {
        return Err(MalformedRecordError::dns(format!(
            "missing owner name in zone {}",
            raw.zone
        )));
    }
    if raw.data.trim().is_empty() {
        return Err(MalformedRecordError::dns(format!(
            "missing data for {} {}",
            raw.record_type, raw.name
        )));
    }

    let owner = qualify_name(&raw.name, &raw.zone);
    let zone = canonical_name(&raw.zone);

    match raw.record_type {
        RecordType::A => {
            if !is_valid_hostname(&owner) {
                return Err(MalformedRecordError::dns(format!("invalid A owner '{}'", owner)));
            }
            let ip: Ipv4Addr = raw.data.trim().parse().map_err(|_| {
                MalformedRecordError::dns(format!("invalid IPv4 '{}' for {}", raw.data, owner))
            })?;
            Ok(DnsFact {
                name: owner,
                ip,
                zone,
                record_type: RecordType::A,
            })
        }
        RecordType::Ptr => {
            let ip = reverse_name_to_ipv4(&owner).ok_or_else(|| {
                MalformedRecordError::dns(format!("PTR owner '{}' is not an IPv4 reverse name", owner))
            })?;
            let target = raw.data.trim();
            if !is_valid_hostname(target) {
                return Err(MalformedRecordError::dns(format!(
                    "invalid PTR target '{}' for {}",
                    target, ip
                )));
            }
            Ok(DnsFact {
                name: canonical_name(target),
                ip,
                zone,
                record_type: RecordType::Ptr,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(zone: &str, name: &str, record_type: RecordType, data: &str) -> RawDnsRecord {
        RawDnsRecord {
            zone: zone.to_string(),
            name: name.to_string(),
            record_type,
            data: data.to_string(),
        }
    }

    #[test]
    fn test_a_record_is_qualified() {
        let fact = normalize_record(&raw("corp.example", "Host1", RecordType::A, "10.0.0.5")).unwrap();
        assert_eq!(fact.name, "host1.corp.example");
        assert_eq!(fact.ip, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(fact.zone, "corp.example");
    }

    #[test]
    fn test_ptr_record_maps_owner_to_ip() {
        let fact = normalize_record(&raw(
            "0.0.10.in-addr.arpa",
            "5",
            RecordType::Ptr,
            "host1.corp.example.",
        ))
        .unwrap();
        assert_eq!(fact.ip, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(fact.name, "host1.corp.example");
        assert_eq!(fact.record_type, RecordType::Ptr);
    }

    #[test]
    fn test_rejects_missing_fields() {
        assert!(normalize_record(&raw("corp.example", "", RecordType::A, "10.0.0.5")).is_err());
        assert!(normalize_record(&raw("corp.example", "host1", RecordType::A, "")).is_err());
    }

    #[test]
    fn test_rejects_bad_a_data() {
        let err = normalize_record(&raw("corp.example", "host1", RecordType::A, "10.0.0")).unwrap_err();
        assert_eq!(err.kind, "dns");
    }

    #[test]
    fn test_rejects_partial_reverse_name() {
        // "5.10.in-addr.arpa" names only two octets
        assert!(normalize_record(&raw("10.in-addr.arpa", "5", RecordType::Ptr, "host1")).is_err());
    }

    #[test]
    fn test_rejects_bad_ptr_target() {
        assert!(normalize_record(&raw("0.0.10.in-addr.arpa", "5", RecordType::Ptr, "bad host")).is_err());
    }
}
