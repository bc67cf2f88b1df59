//! Credential redaction for anything written to the log.
//!
//! The document API takes its key as the `serviceKey` query parameter, so
//! request URLs and parameter lists carry it in clear text. Every log call
//! site that mentions either goes through this module. The whole value is
//! replaced by [`PLACEHOLDER`]; no prefix is kept.

pub const CREDENTIAL_PARAM: &str = "serviceKey";
pub const PLACEHOLDER: &str = "***";

/// Replace every `serviceKey=` value in `url`, leaving the rest untouched.
pub fn redact_url(url: &str) -> String {
    let marker = format!("{}=", CREDENTIAL_PARAM);
    let mut out = String::with_capacity(url.len());
    let mut rest = url;

    while let Some(pos) = find_param(rest, &marker) {
        let value_start = pos + marker.len();
        out.push_str(&rest[..value_start]);
        out.push_str(PLACEHOLDER);

        let value_end = rest[value_start..]
            .find(['&', '#'])
            .map(|i| value_start + i)
            .unwrap_or(rest.len());
        rest = &rest[value_end..];
    }
    out.push_str(rest);
    out
}

/// Position of `marker` where it starts a query parameter name.
fn find_param(haystack: &str, marker: &str) -> Option<usize> {
    let mut offset = 0;
    while let Some(i) = haystack[offset..].find(marker) {
        let pos = offset + i;
        let at_boundary = pos == 0 || matches!(haystack.as_bytes()[pos - 1], b'?' | b'&');
        if at_boundary {
            return Some(pos);
        }
        offset = pos + marker.len();
    }
    None
}

/// Copy of `params` with the credential value replaced, order preserved.
pub fn redact_params<'a>(params: &[(&'a str, String)]) -> Vec<(&'a str, String)> {
    params
        .iter()
        .map(|(key, value)| {
            if *key == CREDENTIAL_PARAM {
                (*key, PLACEHOLDER.to_string())
            } else {
                (*key, value.clone())
            }
        })
        .collect()
}

/// `key=value&...` rendering of redacted parameters for a single log line.
pub fn params_for_log(params: &[(&str, String)]) -> String {
    redact_params(params)
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_url_middle_param() {
        let url = "http://apis.data.go.kr/x/getDocPress?serviceKey=SECRET123&pageNo=1&type=json";
        assert_eq!(
            redact_url(url),
            "http://apis.data.go.kr/x/getDocPress?serviceKey=***&pageNo=1&type=json"
        );
    }

    #[test]
    fn test_redact_url_last_param() {
        let url = "https://host/path?pageNo=2&serviceKey=abc%2Bdef%3D%3D";
        assert_eq!(redact_url(url), "https://host/path?pageNo=2&serviceKey=***");
    }

    #[test]
    fn test_redact_url_without_key_is_unchanged() {
        let url = "https://host/path?pageNo=2&title=%EC%A0%95%EC%B1%85";
        assert_eq!(redact_url(url), url);
    }

    #[test]
    fn test_redact_url_ignores_lookalike_param() {
        let url = "https://host/p?myserviceKey=visible&serviceKey=hidden";
        assert_eq!(redact_url(url), "https://host/p?myserviceKey=visible&serviceKey=***");
    }

    #[test]
    fn test_redact_url_never_leaks_any_part_of_key() {
        let key = "ABCDEFGHIJKLMNOP";
        let redacted = redact_url(&format!("http://h/p?serviceKey={}&a=1", key));
        assert!(!redacted.contains("ABCD"));
    }

    #[test]
    fn test_redact_params_preserves_order() {
        let params = vec![
            ("serviceKey", "SECRET".to_string()),
            ("pageNo", "1".to_string()),
            ("title", "정책".to_string()),
        ];
        let redacted = redact_params(&params);
        assert_eq!(redacted[0], ("serviceKey", "***".to_string()));
        assert_eq!(redacted[1], ("pageNo", "1".to_string()));
        assert_eq!(redacted[2], ("title", "정책".to_string()));
        assert_eq!(params_for_log(&params), "serviceKey=***&pageNo=1&title=정책");
    }
}
