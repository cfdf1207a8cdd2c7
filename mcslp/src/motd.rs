//! Flattens a JSON text component into a legacy `§`-formatted string.
//! [Text formatting](https://minecraft.wiki/w/Formatting_codes)

use std::borrow::Cow;

use serde_json::Value;
use tracing::{debug, warn};

const COLORS: [(&str, char); 16] = [
    ("black", '0'),
    ("dark_blue", '1'),
    ("dark_green", '2'),
    ("dark_aqua", '3'),
    ("dark_red", '4'),
    ("dark_purple", '5'),
    ("gold", '6'),
    ("gray", '7'),
    ("dark_gray", '8'),
    ("blue", '9'),
    ("green", 'a'),
    ("aqua", 'b'),
    ("red", 'c'),
    ("light_purple", 'd'),
    ("yellow", 'e'),
    ("white", 'f'),
];

const BOLD: &str = "§l";
const ITALIC: &str = "§o";
const UNDERLINE: &str = "§n";
const STRIKETHROUGH: &str = "§m";

/// One node of a text component, borrowed from the parsed JSON.
#[derive(Debug)]
enum RichText<'a> {
    Text(&'a str),
    Array(&'a [Value]),
    Object(Styled<'a>),
    Unhandled(&'a Value),
}

#[derive(Debug, Default)]
struct Styled<'a> {
    text: Option<Cow<'a, str>>,
    color: Option<&'a str>,
    bold: bool,
    italic: bool,
    underline: bool,
    strikethrough: bool,
    extra: Option<&'a [Value]>,
}

impl<'a> RichText<'a> {
    fn from_json(value: &'a Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s),
            Value::Array(items) => Self::Array(items),
            Value::Object(map) => Self::Object(Styled {
                text: map.get("text").map(scalar_text),
                color: map.get("color").and_then(Value::as_str),
                bold: flag(map.get("bold")),
                italic: flag(map.get("italic")),
                underline: flag(map.get("underline")),
                strikethrough: flag(map.get("strikethrough")),
                extra: map.get("extra").and_then(Value::as_array).map(Vec::as_slice),
            }),
            other => Self::Unhandled(other),
        }
    }
}

impl Styled<'_> {
    /// The legacy codes for this node's style. Obfuscation (`§k`) is never emitted.
    fn prefix(&self) -> String {
        let mut prefix = String::new();
        if let Some(color) = self.color {
            if let Some((_, code)) = COLORS.iter().find(|(name, _)| *name == color) {
                prefix.push('§');
                prefix.push(*code);
            }
        }
        for (on, code) in [
            (self.bold, BOLD),
            (self.italic, ITALIC),
            (self.underline, UNDERLINE),
            (self.strikethrough, STRIKETHROUGH),
        ] {
            if on {
                prefix.push_str(code);
            }
        }
        if let Some(hex) = self.color.filter(|c| c.starts_with('#')) {
            prefix.push_str(hex);
        }
        prefix
    }
}

fn scalar_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s),
        Value::Null => Cow::Borrowed(""),
        other => Cow::Owned(other.to_string()),
    }
}

fn flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Converts a `description` value into a flat legacy-formatted string.
///
/// Traversal uses an explicit stack, so deeply nested input cannot exhaust the
/// call stack. Shapes other than strings, arrays and objects are skipped.
///
/// # Examples
///
/// ```
/// let description = serde_json::json!({
///     "text": "A",
///     "color": "red",
///     "extra": [{ "text": "B", "bold": true }]
/// });
/// assert_eq!(mcslp::motd::decode(Some(&description)), "§cA§lB");
/// ```
#[must_use]
pub fn decode(description: Option<&Value>) -> String {
    let Some(root) = description else {
        return String::new();
    };
    let mut out = String::new();
    let mut stack = vec![RichText::from_json(root)];

    while let Some(node) = stack.pop() {
        match node {
            RichText::Text(text) => out.push_str(text),
            RichText::Array(items) => {
                stack.extend(items.iter().rev().map(RichText::from_json));
            }
            RichText::Object(styled) => {
                if let Some(extra) = styled.extra {
                    stack.extend(extra.iter().rev().map(RichText::from_json));
                }
                if let Some(text) = &styled.text {
                    out.push_str(&styled.prefix());
                    out.push_str(text);
                }
            }
            RichText::Unhandled(Value::Null) => {}
            RichText::Unhandled(value) => {
                warn!(target: "mcslp::motd", %value, "skipping unhandled MOTD component");
            }
        }
    }

    debug!(target: "mcslp::motd", motd = %out, "decoded MOTD");
    out
}
