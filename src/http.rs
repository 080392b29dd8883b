//! Small response helpers shared by the authentication helpers

use crate::error::{ProbeError, Result};
use reqwest::Response;
use serde_json::Value;

/// Pass 2xx responses through; turn anything else into `ProbeError::Http`
/// carrying the status and body.
pub async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(ProbeError::http(status.as_u16(), body))
    }
}

/// Read a string field from a JSON object, accepting numbers as well since
/// some services return numeric ids.
pub fn string_field(value: &Value, field: &str) -> Result<String> {
    match &value[field] {
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(ProbeError::Token(format!("response has no '{}' field", field))),
    }
}

/// Collect every cookie set by a response as name/value pairs.
pub fn response_cookies(response: &Response) -> Vec<(String, String)> {
    response.cookies().map(|c| (c.name().to_string(), c.value().to_string())).collect()
}

/// Render cookies as a `Cookie` request header value.
pub fn cookie_header(cookies: &[(String, String)]) -> String {
    cookies.iter().map(|(name, value)| format!("{}={}", name, value)).collect::<Vec<_>>().join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_field_accepts_numbers_and_rejects_empty() {
        let body = json!({"id": 42, "key": "glsa_abc", "empty": ""});
        assert_eq!(string_field(&body, "id").unwrap(), "42");
        assert_eq!(string_field(&body, "key").unwrap(), "glsa_abc");
        assert!(matches!(string_field(&body, "empty"), Err(ProbeError::Token(_))));
        assert!(string_field(&body, "missing").is_err());
    }

    #[test]
    fn test_cookie_header_joins_pairs() {
        let cookies = vec![
            ("token".to_string(), "abc".to_string()),
            ("theme".to_string(), "dark".to_string()),
        ];
        assert_eq!(cookie_header(&cookies), "token=abc; theme=dark");
        assert_eq!(cookie_header(&[]), "");
    }
}
