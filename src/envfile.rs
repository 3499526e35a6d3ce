//! Reading and in-place editing of the `.env` file and the frontend's
//! `config.js`. Unrelated lines are always preserved.

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::OnceLock;

pub const ENV_KEYS: &[&str] = &[
    "MONITORED_PC_IP",
    "MONITORED_PC_MAC",
    "SERVER_PC_IP",
    "SPOTIFY_CLIENT_ID",
    "SPOTIFY_CLIENT_SECRET",
    "SPOTIFY_REFRESH_TOKEN",
    "UPLOAD_FOLDER",
    "MONITORED_DISKS",
];

pub const FRONTEND_KEYS: &[&str] = &["SERVER_PC_IP", "MACRO_PC_IP"];

fn env_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.*)$").expect("static regex"))
}

fn env_assign_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*=").expect("static regex"))
}

fn js_object_end_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n?\s*\}\s*;\s*$").expect("static regex"))
}

fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 && bytes[0] == bytes[bytes.len() - 1] && matches!(bytes[0], b'"' | b'\'') {
        return &value[1..value.len() - 1];
    }
    value
}

/// Double-quoted form: backslash, quote and newline are escaped, `\r` dropped.
fn escape_env_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "")
}

/// Inverse of [`escape_env_value`] for double-quoted values. Single-quoted and
/// bare values are taken literally; unknown escapes keep their backslash.
fn unquote_env_value(raw: &str) -> String {
    let inner = strip_quotes(raw);
    if inner.len() == raw.len() || !raw.starts_with('"') {
        return inner.to_string();
    }

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some(escaped @ ('"' | '\\')) => out.push(escaped),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn escape_js_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "")
}

pub fn parse_env(text: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(caps) = env_line_re().captures(line) {
            out.insert(caps[1].to_string(), unquote_env_value(caps[2].trim()));
        }
    }
    out
}

/// Missing file reads as empty.
pub fn read_env_file(path: &Path) -> io::Result<BTreeMap<String, String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(parse_env(&text)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(err) => Err(err),
    }
}

pub fn apply_env_updates(text: &str, updates: &BTreeMap<String, String>) -> String {
    let mut seen = Vec::new();
    let mut lines: Vec<String> = text
        .lines()
        .map(|line| match env_assign_re().captures(line) {
            Some(caps) if updates.contains_key(&caps[1]) => {
                let key = caps[1].to_string();
                let line = format!("{key}=\"{}\"", escape_env_value(&updates[&key]));
                seen.push(key);
                line
            }
            _ => line.to_string(),
        })
        .collect();

    for (key, value) in updates {
        if !seen.contains(key) {
            lines.push(format!("{key}=\"{}\"", escape_env_value(value)));
        }
    }

    let mut content = lines.join("\n").trim_end().to_string();
    content.push('\n');
    content
}

pub fn update_env_file(path: &Path, updates: &BTreeMap<String, String>) -> io::Result<()> {
    let existing = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err),
    };
    fs::write(path, apply_env_updates(&existing, updates))
}

fn frontend_value_re(key: &str) -> Regex {
    Regex::new(&format!(r#"\b{}\s*:\s*['"]([^'"]*)['"]"#, regex::escape(key))).expect("escaped key")
}

fn frontend_assign_re(key: &str) -> Regex {
    Regex::new(&format!(
        r#"(\b{}\s*:\s*)(?:"[^"]*"|'[^']*')"#,
        regex::escape(key)
    ))
    .expect("escaped key")
}

pub fn parse_frontend_config(text: &str) -> BTreeMap<String, String> {
    FRONTEND_KEYS
        .iter()
        .filter_map(|key| {
            frontend_value_re(key)
                .captures(text)
                .map(|caps| (key.to_string(), caps[1].to_string()))
        })
        .collect()
}

pub fn read_frontend_config(path: &Path) -> io::Result<BTreeMap<String, String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(parse_frontend_config(&text)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(err) => Err(err),
    }
}

fn render_frontend_entries<'a>(entries: impl Iterator<Item = (&'a String, &'a String)>) -> String {
    entries
        .map(|(k, v)| format!("    {k}: \"{}\",", escape_js_value(v)))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn apply_frontend_updates(text: &str, updates: &BTreeMap<String, String>) -> String {
    let mut updated = text.to_string();
    let mut missing = BTreeMap::new();

    for (key, value) in updates {
        let re = frontend_assign_re(key);
        if re.is_match(&updated) {
            let escaped = escape_js_value(value);
            updated = re
                .replace_all(&updated, |caps: &Captures| format!("{}\"{}\"", &caps[1], escaped))
                .into_owned();
        } else {
            missing.insert(key.clone(), value.clone());
        }
    }

    if missing.is_empty() {
        return updated;
    }

    let insert = render_frontend_entries(missing.iter());
    match js_object_end_re().find(&updated) {
        Some(m) => {
            let idx = m.start();
            format!("{}\n{}{}", &updated[..idx], insert, &updated[idx..])
        }
        None => format!("{}\n{}\n", updated.trim_end(), insert),
    }
}

pub fn update_frontend_config(path: &Path, updates: &BTreeMap<String, String>) -> io::Result<()> {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let body = format!("const CONFIG = {{\n{}\n}};\n", render_frontend_entries(updates.iter()));
            return fs::write(path, body);
        }
        Err(err) => return Err(err),
    };

    let updated = apply_frontend_updates(&content, updates);
    if updated != content {
        fs::write(path, updated)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_env_lines() {
        let env = parse_env(
            "# comment\n\nMONITORED_PC_IP = \"10.0.0.5\"\nMONITORED_DISKS='C:, D:'\n1BAD=x\nplain=value\n",
        );
        assert_eq!(env.get("MONITORED_PC_IP").map(String::as_str), Some("10.0.0.5"));
        assert_eq!(env.get("MONITORED_DISKS").map(String::as_str), Some("C:, D:"));
        assert_eq!(env.get("plain").map(String::as_str), Some("value"));
        assert!(!env.contains_key("1BAD"));
    }

    #[test]
    fn env_updates_replace_in_place_and_append() {
        let text = "# header\nMONITORED_PC_IP=1.1.1.1\nOTHER=keep\n";
        let out = apply_env_updates(
            text,
            &map(&[("MONITORED_PC_IP", "10.0.0.7"), ("MONITORED_PC_MAC", "aa\"bb")]),
        );
        assert_eq!(
            out,
            "# header\nMONITORED_PC_IP=\"10.0.0.7\"\nOTHER=keep\nMONITORED_PC_MAC=\"aa\\\"bb\"\n"
        );
    }

    #[test]
    fn written_values_read_back_unchanged() {
        let values = map(&[
            ("MONITORED_PC_MAC", "aa\"bb"),
            ("UPLOAD_FOLDER", "C:\\pics\\"),
            ("MONITORED_DISKS", "C:\r\nMONITORED_PC_IP=6.6.6.6"),
        ]);
        let text = apply_env_updates("", &values);
        assert_eq!(text.lines().count(), 3);

        let env = parse_env(&text);
        assert_eq!(env.len(), 3);
        assert_eq!(env["MONITORED_PC_MAC"], "aa\"bb");
        assert_eq!(env["UPLOAD_FOLDER"], "C:\\pics\\");
        assert_eq!(env["MONITORED_DISKS"], "C:\nMONITORED_PC_IP=6.6.6.6");
        assert!(!env.contains_key("MONITORED_PC_IP"));
    }

    #[test]
    fn hand_written_values_keep_unknown_escapes() {
        let env = parse_env("A=\"C:\\temp\"\nB='x\\ny'\nC=plain\\n\n");
        assert_eq!(env["A"], "C:\\temp");
        assert_eq!(env["B"], "x\\ny");
        assert_eq!(env["C"], "plain\\n");
    }

    #[test]
    fn env_file_round_trip_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        assert!(read_env_file(&path).unwrap().is_empty());

        update_env_file(&path, &map(&[("UPLOAD_FOLDER", "pics")])).unwrap();
        let env = read_env_file(&path).unwrap();
        assert_eq!(env.get("UPLOAD_FOLDER").map(String::as_str), Some("pics"));
    }

    #[test]
    fn frontend_updates_replace_and_insert() {
        let text = "const CONFIG = {\n    SERVER_PC_IP: '192.168.1.2',\n};\n";
        let out = apply_frontend_updates(
            text,
            &map(&[("SERVER_PC_IP", "10.0.0.2"), ("MACRO_PC_IP", "10.0.0.3:5001")]),
        );
        assert!(out.contains("SERVER_PC_IP: \"10.0.0.2\""));
        assert!(out.contains("    MACRO_PC_IP: \"10.0.0.3:5001\","));
        assert!(out.trim_end().ends_with("};"));

        let parsed = parse_frontend_config(&out);
        assert_eq!(parsed.get("MACRO_PC_IP").map(String::as_str), Some("10.0.0.3:5001"));
    }

    #[test]
    fn frontend_config_is_created_when_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frontend").join("config.js");
        update_frontend_config(&path, &map(&[("SERVER_PC_IP", "host")])).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "const CONFIG = {\n    SERVER_PC_IP: \"host\",\n};\n");
        assert_eq!(
            read_frontend_config(&path).unwrap().get("SERVER_PC_IP").map(String::as_str),
            Some("host")
        );
    }
}
