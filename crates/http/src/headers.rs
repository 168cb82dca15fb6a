//! Header field inspection helpers.
//!
//! `Connection` is a comma-separated token list and may appear several times
//! in a request, so persistence and upgrade decisions scan every occurrence
//! with case-insensitive token matching.

use http::header::{HeaderMap, CONNECTION, EXPECT};

pub(crate) fn connection_has(headers: &HeaderMap, token: &str) -> bool {
    for value in headers.get_all(CONNECTION) {
        if let Ok(list) = value.to_str() {
            if list.split(',').any(|candidate| candidate.trim().eq_ignore_ascii_case(token)) {
                return true;
            }
        }
    }
    false
}

pub(crate) fn connection_keep_alive(headers: &HeaderMap) -> bool {
    connection_has(headers, "keep-alive")
}

pub(crate) fn connection_close(headers: &HeaderMap) -> bool {
    connection_has(headers, "close")
}

pub(crate) fn connection_upgrade(headers: &HeaderMap) -> bool {
    connection_has(headers, "upgrade")
}

/// Whether the request carries `Expect: 100-continue`.
pub(crate) fn expects_continue(headers: &HeaderMap) -> bool {
    match headers.get(EXPECT) {
        Some(value) => {
            let bytes = value.as_bytes();
            bytes.len() >= 4 && bytes[..4].eq_ignore_ascii_case(b"100-")
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderMap;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                http::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        map
    }

    #[test]
    fn matches_single_token() {
        let map = headers(&[("connection", "keep-alive")]);
        assert!(connection_keep_alive(&map));
        assert!(!connection_close(&map));
    }

    #[test]
    fn matches_token_in_list_case_insensitively() {
        let map = headers(&[("connection", "Upgrade, Keep-Alive")]);
        assert!(connection_keep_alive(&map));
        assert!(connection_upgrade(&map));
    }

    #[test]
    fn matches_across_repeated_fields() {
        let map = headers(&[("connection", "upgrade"), ("connection", "close")]);
        assert!(connection_close(&map));
        assert!(connection_upgrade(&map));
    }

    #[test]
    fn rejects_substring_of_larger_token() {
        let map = headers(&[("connection", "keep-alive-ish")]);
        assert!(!connection_keep_alive(&map));
    }

    #[test]
    fn expect_continue_detection() {
        assert!(expects_continue(&headers(&[("expect", "100-continue")])));
        assert!(expects_continue(&headers(&[("expect", "100-Continue")])));
        assert!(!expects_continue(&headers(&[("expect", "200-ok")])));
        assert!(!expects_continue(&HeaderMap::new()));
    }
}
