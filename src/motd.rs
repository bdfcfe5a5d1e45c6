//! MOTD formatting. Minecraft servers return their greeting either as a
//! legacy `§`-coded string or as a JSON chat component tree; both are
//! flattened here into raw / clean / HTML renditions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Motd {
    pub raw: String,
    pub clean: String,
    pub html: String,
}

/// Builds an `Motd` from a status-response `description` value, which is
/// either a plain string or a chat component object.
pub fn parse(description: &Value) -> Motd {
    let raw = match description {
        Value::String(s) => s.clone(),
        Value::Object(_) | Value::Array(_) => flatten_component(description),
        _ => String::new(),
    };
    from_raw(raw)
}

pub fn from_raw(raw: String) -> Motd {
    let clean = strip_codes(&raw);
    let html = to_html(&raw);
    Motd { raw, clean, html }
}

/// Removes every `§x` pair where x is a legacy formatting code
/// (case-insensitive, `0-9`, `a-f`, `k-o`, `r`).
pub fn strip_codes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '§' {
            if let Some(&next) = chars.peek() {
                if is_format_code(next) {
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

fn is_format_code(c: char) -> bool {
    let c = c.to_ascii_lowercase();
    c.is_ascii_digit() || ('a'..='f').contains(&c) || ('k'..='o').contains(&c) || c == 'r'
}

fn color_hex(code: char) -> Option<&'static str> {
    Some(match code.to_ascii_lowercase() {
        '0' => "#000000",
        '1' => "#0000aa",
        '2' => "#00aa00",
        '3' => "#00aaaa",
        '4' => "#aa0000",
        '5' => "#aa00aa",
        '6' => "#ffaa00",
        '7' => "#aaaaaa",
        '8' => "#555555",
        '9' => "#5555ff",
        'a' => "#55ff55",
        'b' => "#55ffff",
        'c' => "#ff5555",
        'd' => "#ff55ff",
        'e' => "#ffff55",
        'f' => "#ffffff",
        _ => return None,
    })
}

fn color_code(name: &str) -> Option<char> {
    Some(match name {
        "black" => '0',
        "dark_blue" => '1',
        "dark_green" => '2',
        "dark_aqua" => '3',
        "dark_red" => '4',
        "dark_purple" => '5',
        "gold" => '6',
        "gray" => '7',
        "dark_gray" => '8',
        "blue" => '9',
        "green" => 'a',
        "aqua" => 'b',
        "red" => 'c',
        "light_purple" => 'd',
        "yellow" => 'e',
        "white" => 'f',
        _ => return None,
    })
}

/// Flattens a JSON chat component tree back into a legacy-coded string.
/// Named colors and the boolean format flags map to their `§` codes;
/// anything else (hex colors, hover events) contributes text only.
fn flatten_component(value: &Value) -> String {
    let mut out = String::new();
    walk_component(value, &mut out);
    out
}

fn walk_component(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => out.push_str(s),
        Value::Array(items) => {
            for item in items {
                walk_component(item, out);
            }
        }
        Value::Object(obj) => {
            if let Some(code) = obj
                .get("color")
                .and_then(Value::as_str)
                .and_then(color_code)
            {
                out.push('§');
                out.push(code);
            }
            for (key, code) in [
                ("obfuscated", 'k'),
                ("bold", 'l'),
                ("strikethrough", 'm'),
                ("underlined", 'n'),
                ("italic", 'o'),
            ] {
                if obj.get(key).and_then(Value::as_bool) == Some(true) {
                    out.push('§');
                    out.push(code);
                }
            }
            if let Some(text) = obj.get("text").and_then(Value::as_str) {
                out.push_str(text);
            }
            if let Some(extra) = obj.get("extra") {
                walk_component(extra, out);
            }
        }
        _ => {}
    }
}

#[derive(Default, Clone, PartialEq)]
struct Style {
    color: Option<&'static str>,
    bold: bool,
    italic: bool,
    underline: bool,
    strikethrough: bool,
}

impl Style {
    fn css(&self) -> String {
        let mut css = String::new();
        if let Some(color) = self.color {
            css.push_str(&format!("color:{};", color));
        }
        if self.bold {
            css.push_str("font-weight:bold;");
        }
        if self.italic {
            css.push_str("font-style:italic;");
        }
        match (self.underline, self.strikethrough) {
            (true, true) => css.push_str("text-decoration:underline line-through;"),
            (true, false) => css.push_str("text-decoration:underline;"),
            (false, true) => css.push_str("text-decoration:line-through;"),
            (false, false) => {}
        }
        css
    }
}

/// Renders a legacy-coded string as HTML spans. A color code resets the
/// active formatting, matching vanilla client behavior.
pub fn to_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 2);
    let mut style = Style::default();
    let mut run = String::new();
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '§' {
            if let Some(&code) = chars.peek() {
                if is_format_code(code) {
                    chars.next();
                    flush_run(&mut out, &style, &mut run);
                    match code.to_ascii_lowercase() {
                        'l' => style.bold = true,
                        'o' => style.italic = true,
                        'n' => style.underline = true,
                        'm' => style.strikethrough = true,
                        'k' => {} // obfuscated text is not representable statically
                        'r' => style = Style::default(),
                        color => {
                            style = Style {
                                color: color_hex(color),
                                ..Style::default()
                            };
                        }
                    }
                    continue;
                }
            }
        }
        match c {
            '&' => run.push_str("&amp;"),
            '<' => run.push_str("&lt;"),
            '>' => run.push_str("&gt;"),
            '\n' => {
                flush_run(&mut out, &style, &mut run);
                out.push_str("<br>");
            }
            _ => run.push(c),
        }
    }
    flush_run(&mut out, &style, &mut run);
    out
}

fn flush_run(out: &mut String, style: &Style, run: &mut String) {
    if run.is_empty() {
        return;
    }
    if *style == Style::default() {
        out.push_str(run);
    } else {
        out.push_str(&format!("<span style=\"{}\">{}</span>", style.css(), run));
    }
    run.clear();
}
