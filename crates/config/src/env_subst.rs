//! `${ENV_VAR}` substitution for string values loaded from a config file.

use std::env;

/// Replace every `${NAME}` occurrence in `input` with the value of the
/// environment variable `NAME`. Unset variables are left untouched so a
/// missing value is visible in the resulting config rather than silently
/// becoming an empty string.
pub fn substitute(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'{') {
            if let Some(end) = input[i + 2..].find('}') {
                let name = &input[i + 2..i + 2 + end];
                match env::var(name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => {
                        out.push_str(&input[i..i + 2 + end + 1]);
                    },
                }
                i += 2 + end + 1;
                continue;
            }
        }
        let ch = input[i..].chars().next().unwrap_or('\0');
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

/// Recursively substitute `${VAR}` in every string leaf of a JSON value.
pub fn substitute_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::String(s) => *s = substitute(s),
        serde_json::Value::Array(items) => items.iter_mut().for_each(substitute_json),
        serde_json::Value::Object(map) => map.values_mut().for_each(substitute_json),
        _ => {},
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_var() {
        // SAFETY: single-threaded test process only touches its own env var.
        unsafe {
            env::set_var("RELAYCHAT_TEST_VAR", "hello");
        }
        assert_eq!(substitute("value=${RELAYCHAT_TEST_VAR}"), "value=hello");
    }

    #[test]
    fn leaves_unset_var_untouched() {
        assert_eq!(
            substitute("value=${RELAYCHAT_DEFINITELY_UNSET}"),
            "value=${RELAYCHAT_DEFINITELY_UNSET}"
        );
    }

    #[test]
    fn substitutes_in_nested_json() {
        unsafe {
            env::set_var("RELAYCHAT_TEST_VAR2", "world");
        }
        let mut value = serde_json::json!({"a": ["${RELAYCHAT_TEST_VAR2}", 1]});
        substitute_json(&mut value);
        assert_eq!(value["a"][0], "world");
    }
}
