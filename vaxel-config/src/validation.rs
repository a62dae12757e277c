//! Custom validation functions shared by the configuration sections.

use std::net::SocketAddr;

use validator::ValidationError;

use crate::forwarding::DefaultEntryConfig;

/// Listen addresses must parse as `host:port`.
pub fn validate_socket_addr(addr: &str) -> Result<(), ValidationError> {
    addr.parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("invalid_socket_addr"))
}

pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let re = regex::Regex::new("^(?i)(error|warn|info|debug|trace)$")
        .map_err(|_| ValidationError::new("invalid_regex"))?;
    if re.is_match(level) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}

pub fn validate_policy(policy: &str) -> Result<(), ValidationError> {
    let re = regex::Regex::new("^(flood|drop|learning)$")
        .map_err(|_| ValidationError::new("invalid_regex"))?;
    if re.is_match(policy) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_policy"))
    }
}

fn check_pattern(pattern: &str, value: &str, code: &'static str) -> Result<(), ValidationError> {
    let re = regex::Regex::new(pattern).map_err(|_| ValidationError::new("invalid_regex"))?;
    if re.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new(code))
    }
}

pub fn validate_entry_kind(kind: &str) -> Result<(), ValidationError> {
    check_pattern(
        "^(all|ethertype|arp|ip_proto|icmp|igmp|udp|tcp)$",
        kind,
        "invalid_entry_kind",
    )
}

pub fn validate_entry_action(action: &str) -> Result<(), ValidationError> {
    check_pattern("^(drop|controller|flood)$", action, "invalid_entry_action")
}

/// A band name or a raw 16-bit priority.
pub fn validate_priority(priority: &str) -> Result<(), ValidationError> {
    if priority.parse::<u16>().is_ok() {
        return Ok(());
    }
    check_pattern(
        "^(?i)(highest|higher|high|default|low|lower|lowest)$",
        priority,
        "invalid_priority",
    )
}

/// Kinds that match on a value need that value.
pub fn validate_default_entry(entry: &DefaultEntryConfig) -> Result<(), ValidationError> {
    match entry.kind.as_str() {
        "ethertype" if entry.ethertype.is_none() => {
            Err(ValidationError::new("missing_ethertype"))
        }
        "ip_proto" if entry.ip_proto.is_none() => Err(ValidationError::new("missing_ip_proto")),
        "udp" | "tcp" => Ok(()),
        _ if entry.port.is_some() => Err(ValidationError::new("port_without_transport")),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_addresses() {
        assert!(validate_socket_addr("0.0.0.0:6633").is_ok());
        assert!(validate_socket_addr("[::1]:6653").is_ok());
        assert!(validate_socket_addr("localhost").is_err());
    }

    #[test]
    fn log_levels_are_case_insensitive() {
        assert!(validate_log_level("DEBUG").is_ok());
        assert!(validate_log_level("verbose").is_err());
    }

    #[test]
    fn policies() {
        assert!(validate_policy("learning").is_ok());
        assert!(validate_policy("nat").is_err());
    }

    #[test]
    fn default_entry_fields() {
        assert!(validate_entry_kind("udp").is_ok());
        assert!(validate_entry_kind("sctp").is_err());
        assert!(validate_entry_action("controller").is_ok());
        assert!(validate_entry_action("mirror").is_err());
        assert!(validate_priority("Low").is_ok());
        assert!(validate_priority("4096").is_ok());
        assert!(validate_priority("70000").is_err());
    }

    #[test]
    fn default_entries_need_their_match_value() {
        let entry = |kind: &str| DefaultEntryConfig {
            kind: kind.into(),
            action: "drop".into(),
            priority: None,
            ethertype: None,
            ip_proto: None,
            port: None,
        };
        assert!(validate_default_entry(&entry("ethertype")).is_err());
        assert!(validate_default_entry(&entry("ip_proto")).is_err());
        assert!(validate_default_entry(&entry("arp")).is_ok());
        assert!(validate_default_entry(&DefaultEntryConfig {
            port: Some(80),
            ..entry("icmp")
        })
        .is_err());
        assert!(validate_default_entry(&DefaultEntryConfig {
            port: Some(80),
            ..entry("tcp")
        })
        .is_ok());
    }
}
