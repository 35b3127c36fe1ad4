//! Output formatting.

use serde_json::Value;

/// Prints `value` as pretty JSON, or single-line JSON when `compact` is set.
pub fn print(value: &Value, compact: bool) -> eyre::Result<()> {
    println!("{}", render(value, compact)?);
    Ok(())
}

fn render(value: &Value, compact: bool) -> eyre::Result<String> {
    let rendered = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_render_modes() {
        let value = json!({ "isUnlocked": true });
        assert_eq!(render(&value, true).expect("compact"), r#"{"isUnlocked":true}"#);
        assert_eq!(
            render(&value, false).expect("pretty"),
            "{\n  \"isUnlocked\": true\n}"
        );
    }
}
