/// A user-supplied server address split into host and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub host: String,
    pub port: u16,
}

/// Splits `host[:port]` into its parts, applying `default_port` when the
/// input carries no usable port. Never fails; whatever is left of the host
/// is handed to the resolver as-is.
///
/// Bracketed IPv6 (`[::1]` or `[::1]:25566`) is unwrapped. An unbracketed
/// string with more than one colon is taken as a bare IPv6 literal.
pub fn parse(input: &str, default_port: u16) -> Address {
    if let Some(rest) = input.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail
                .strip_prefix(':')
                .and_then(parse_port)
                .unwrap_or(default_port);
            return Address {
                host: host.to_string(),
                port,
            };
        }
        // Unterminated bracket, treat the whole thing as a host
        return Address {
            host: input.to_string(),
            port: default_port,
        };
    }

    if input.matches(':').count() > 1 {
        // Bare IPv6 literal
        return Address {
            host: input.to_string(),
            port: default_port,
        };
    }

    match input.rsplit_once(':') {
        Some((host, port_str)) => {
            let port = parse_port(port_str).unwrap_or(default_port);
            Address {
                host: host.to_string(),
                port,
            }
        }
        None => Address {
            host: input.to_string(),
            port: default_port,
        },
    }
}

fn parse_port(s: &str) -> Option<u16> {
    match s.parse::<u16>() {
        Ok(p) if p > 0 => Some(p),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT: u16 = 25565;

    fn addr(host: &str, port: u16) -> Address {
        Address {
            host: host.to_string(),
            port,
        }
    }

    #[test]
    fn host_only_gets_default_port() {
        assert_eq!(parse("mc.example.com", DEFAULT), addr("mc.example.com", DEFAULT));
    }

    #[test]
    fn host_with_port() {
        assert_eq!(parse("mc.example.com:25580", DEFAULT), addr("mc.example.com", 25580));
    }

    #[test]
    fn non_numeric_port_falls_back() {
        assert_eq!(parse("mc.example.com:abc", DEFAULT), addr("mc.example.com", DEFAULT));
        assert_eq!(parse("mc.example.com:", DEFAULT), addr("mc.example.com", DEFAULT));
        assert_eq!(parse("mc.example.com:0", DEFAULT), addr("mc.example.com", DEFAULT));
        assert_eq!(parse("mc.example.com:99999", DEFAULT), addr("mc.example.com", DEFAULT));
    }

    #[test]
    fn bracketed_ipv6() {
        assert_eq!(parse("[2001:db8::1]", DEFAULT), addr("2001:db8::1", DEFAULT));
        assert_eq!(parse("[2001:db8::1]:25580", DEFAULT), addr("2001:db8::1", 25580));
        assert_eq!(parse("[::1]:bad", DEFAULT), addr("::1", DEFAULT));
    }

    #[test]
    fn bare_ipv6_keeps_default_port() {
        assert_eq!(parse("2001:db8::1", DEFAULT), addr("2001:db8::1", DEFAULT));
        assert_eq!(parse("::1", DEFAULT), addr("::1", DEFAULT));
    }

    #[test]
    fn ipv4_with_port() {
        assert_eq!(parse("203.0.113.5:19132", DEFAULT), addr("203.0.113.5", 19132));
    }
}
