use std::collections::BTreeMap;

use crate::errors::HeaderError;

/// One clause of a module header
///
/// `com.acme.orders; version=1.2; timeout-milliseconds:=5000`
/// has the path `com.acme.orders`, the attribute `version` and the directive `timeout-milliseconds`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathElement {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub directives: BTreeMap<String, String>,
}
impl PathElement {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn directive(&self, name: &str) -> Option<&str> {
        self.directives.get(name).map(String::as_str)
    }
}

/// Parses a header into its path elements.
///
/// Clauses are separated by `,`. Inside a clause, `;` separates paths from parameters.
/// Several paths may share the parameters of their clause (`a;b;x:=1`), in which case
/// every path gets its own copy. Values may be quoted with `"` to contain separators.
pub fn parse_header(header: &str) -> Result<Vec<PathElement>, HeaderError> {
    let mut elements = Vec::new();

    for clause in split_unquoted(header, ',')? {
        let clause = clause.trim();
        if clause.is_empty() {
            continue;
        }

        let mut paths = Vec::new();
        let mut attributes = BTreeMap::new();
        let mut directives = BTreeMap::new();

        for part in split_unquoted(clause, ';')? {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            match split_parameter(part) {
                Some((name, value, is_directive)) => {
                    if name.is_empty() {
                        return Err(HeaderError::UnnamedParameter(clause.to_string()));
                    }
                    let target = if is_directive {
                        &mut directives
                    } else {
                        &mut attributes
                    };
                    target.insert(name.to_string(), unquote(value));
                }
                None => paths.push(part.to_string()),
            }
        }

        for name in paths {
            elements.push(PathElement {
                name,
                attributes: attributes.clone(),
                directives: directives.clone(),
            });
        }
    }

    if elements.is_empty() {
        return Err(HeaderError::Empty);
    }
    Ok(elements)
}

/// Splits `name=value` or `name:=value`, ignoring separators inside quotes.
///
/// Returns `None` for a plain path.
fn split_parameter(part: &str) -> Option<(&str, &str, bool)> {
    let mut quoted = false;
    for (idx, ch) in part.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            '=' if !quoted => {
                let (name, is_directive) = match part[..idx].strip_suffix(':') {
                    Some(name) => (name, true),
                    None => (&part[..idx], false),
                };
                return Some((name.trim(), part[idx + 1..].trim(), is_directive));
            }
            _ => {}
        }
    }
    None
}

fn split_unquoted(input: &str, separator: char) -> Result<Vec<&str>, HeaderError> {
    let mut parts = Vec::new();
    let mut quoted_at = None;
    let mut start = 0;

    for (idx, ch) in input.char_indices() {
        match ch {
            '"' => {
                quoted_at = match quoted_at {
                    Some(_) => None,
                    None => Some(idx),
                }
            }
            c if c == separator && quoted_at.is_none() => {
                parts.push(&input[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }

    if let Some(offset) = quoted_at {
        return Err(HeaderError::UnterminatedQuote(offset));
    }
    parts.push(&input[start..]);
    Ok(parts)
}

fn unquote(value: &str) -> String {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_attributes_and_directives() {
        let elements =
            parse_header("com.acme.orders; version=1.2; timeout-milliseconds:=5000").unwrap();

        assert_eq!(elements.len(), 1);
        let element = &elements[0];
        assert_eq!(element.name, "com.acme.orders");
        assert_eq!(element.attribute("version"), Some("1.2"));
        assert_eq!(element.directive("timeout-milliseconds"), Some("5000"));
        assert_eq!(element.directive("version"), None);
    }

    #[test]
    fn quoted_values_keep_separators() {
        let elements = parse_header(r#"a; note:="x;y,z", b"#).unwrap();

        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].directive("note"), Some("x;y,z"));
        assert_eq!(elements[1].name, "b");
    }

    #[test]
    fn shared_parameters_are_copied_to_every_path() {
        let elements = parse_header("a;b;wait-for-dependencies:=false").unwrap();

        assert_eq!(elements.len(), 2);
        assert!(elements
            .iter()
            .all(|e| e.directive("wait-for-dependencies") == Some("false")));
    }

    #[test]
    fn rejects_broken_headers() {
        assert_eq!(parse_header("  ,  "), Err(HeaderError::Empty));
        assert!(matches!(
            parse_header(r#"a; x:="open"#),
            Err(HeaderError::UnterminatedQuote(_))
        ));
        assert!(matches!(
            parse_header("a; :=1"),
            Err(HeaderError::UnnamedParameter(_))
        ));
    }
}
