use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

/// Read a `KEY=value` env file. Blank lines and `#` comments are skipped and
/// matching surrounding quotes are stripped from values.
pub fn load_env_file(path: &Path) -> io::Result<BTreeMap<String, String>> {
    let contents = fs::read_to_string(path)?;
    Ok(parse_env(&contents))
}

pub fn parse_env(contents: &str) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            env.insert(key.trim().to_string(), unquote(value.trim()).to_string());
        }
    }
    env
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keys_comments_and_quotes() {
        let env = parse_env(
            "# ROS settings\n\nROS_DOMAIN_ID=7\nNAME = \"arm one\"\nPATHS='/a:/b'\nURL=http://x?a=b\nbroken line\nHALF=\"open\n",
        );
        assert_eq!(env["ROS_DOMAIN_ID"], "7");
        assert_eq!(env["NAME"], "arm one");
        assert_eq!(env["PATHS"], "/a:/b");
        assert_eq!(env["URL"], "http://x?a=b");
        assert_eq!(env["HALF"], "\"open");
        assert_eq!(env.len(), 5);
    }

    #[test]
    fn later_keys_override_earlier_ones() {
        let env = parse_env("A=1\nA=2\n");
        assert_eq!(env["A"], "2");
    }
}
