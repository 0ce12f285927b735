//! Autocomplete normalization of a keyword into the upstream's own spelling.

use serde_json::Value;

use super::ProcessError;

const AUTOCOMPLETE_ENDPOINT: &str = "https://mac.search.naver.com/mobile/ac";

/// Autocomplete request URL for a keyword.
pub fn autocomplete_url(keyword: &str) -> String {
    format!(
        "{}?_callback=_jsonp_0&q={}&con=1&q_enc=UTF-8&st=1&frm=mobile_nv&r_format=json&r_enc=UTF-8&r_unicode=0&t_koreng=1&ans=2&run=2&rev=4",
        AUTOCOMPLETE_ENDPOINT,
        urlencoding::encode(keyword)
    )
}

/// Pick the autocomplete suggestion that spells `keyword`.
///
/// Suggestions are compared with whitespace removed and case folded; the
/// suggestion's own spacing is kept. Falls back to `keyword` when nothing
/// matches or the payload carries no suggestions. A body that is not a JSONP
/// envelope around JSON is an error.
pub fn normalize_keyword(body: &str, keyword: &str) -> Result<String, ProcessError> {
    let payload = unwrap_jsonp(body)?;
    let value: Value = serde_json::from_str(&payload)
        .map_err(|e| ProcessError::Autocomplete(format!("invalid JSON: {}", e)))?;

    let target = squash(keyword);
    let suggestions = value
        .get("items")
        .and_then(|items| items.get(0))
        .and_then(Value::as_array);

    let mut chosen = keyword.to_string();
    for entry in suggestions.into_iter().flatten() {
        let Some(text) = entry.get(0).and_then(Value::as_str) else {
            continue;
        };
        if squash(text) == target {
            chosen = text.to_string();
        }
    }
    Ok(chosen)
}

/// Strip a `callback( ... )` wrapper and any control characters.
fn unwrap_jsonp(body: &str) -> Result<String, ProcessError> {
    let (Some(open), Some(close)) = (body.find('('), body.rfind(')')) else {
        return Err(ProcessError::Autocomplete("missing callback wrapper".into()));
    };
    if close <= open {
        return Err(ProcessError::Autocomplete("malformed callback wrapper".into()));
    }

    Ok(body[open + 1..close]
        .chars()
        .filter(|c| !is_control(*c))
        .collect())
}

fn is_control(c: char) -> bool {
    let code = c as u32;
    code <= 0x1f || (0x7f..=0x9f).contains(&code)
}

fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}
