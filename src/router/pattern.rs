//! Route pattern parsing.

use std::fmt;

use super::RouteError;

/// One `/`-separated piece of a pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Static(String),
    /// `:name`, matches a single segment.
    Param(String),
    /// `*name`, matches the rest of the path. Always last.
    CatchAll(String),
}

/// A validated route pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    segments: Vec<Segment>,
}

impl Pattern {
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        let invalid = |reason: &str| RouteError::InvalidPattern {
            pattern: raw.to_string(),
            reason: reason.to_string(),
        };

        let Some(rest) = raw.strip_prefix('/') else {
            return Err(invalid("must start with '/'"));
        };

        let parts: Vec<&str> = rest.split('/').collect();
        let mut segments = Vec::with_capacity(parts.len());
        let mut names: Vec<&str> = Vec::new();

        for (i, part) in parts.iter().enumerate() {
            let segment = if let Some(name) = part.strip_prefix(':') {
                check_name(name).map_err(|r| invalid(r))?;
                if names.contains(&name) {
                    return Err(invalid("duplicate parameter name"));
                }
                names.push(name);
                Segment::Param(name.to_string())
            } else if let Some(name) = part.strip_prefix('*') {
                check_name(name).map_err(|r| invalid(r))?;
                if i + 1 != parts.len() {
                    return Err(invalid("catch-all must be the last segment"));
                }
                if names.contains(&name) {
                    return Err(invalid("duplicate parameter name"));
                }
                names.push(name);
                Segment::CatchAll(name.to_string())
            } else {
                if i + 1 != parts.len() && part.is_empty() {
                    return Err(invalid("empty segment"));
                }
                Segment::Static(part.to_string())
            };
            segments.push(segment);
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Names of the captured parameters, in order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(n) | Segment::CatchAll(n) => Some(n.as_str()),
            Segment::Static(_) => None,
        })
    }

    pub fn has_catch_all(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::CatchAll(_)))
    }

    /// Syntax understood by `matchit` (`{id}`, `{*rest}`).
    pub fn to_matchit(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            match segment {
                Segment::Static(s) => out.push_str(&s.replace('{', "{{").replace('}', "}}")),
                Segment::Param(n) => {
                    out.push('{');
                    out.push_str(n);
                    out.push('}');
                }
                Segment::CatchAll(n) => {
                    out.push_str("{*");
                    out.push_str(n);
                    out.push('}');
                }
            }
        }
        out
    }

    /// Anchored regular expression with one named group per parameter.
    pub fn to_regex(&self) -> String {
        let mut out = String::from("^");
        for segment in &self.segments {
            out.push('/');
            match segment {
                Segment::Static(s) => out.push_str(&::regex::escape(s)),
                Segment::Param(n) => {
                    out.push_str("(?P<");
                    out.push_str(n);
                    out.push_str(">[^/]+)");
                }
                Segment::CatchAll(n) => {
                    out.push_str("(?P<");
                    out.push_str(n);
                    out.push_str(">.+)");
                }
            }
        }
        out.push('$');
        out
    }
}

fn check_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("parameter name is empty");
    }
    if !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return Err("parameter names may only contain [A-Za-z0-9_]");
    }
    if name.as_bytes()[0].is_ascii_digit() {
        return Err("parameter names may not start with a digit");
    }
    Ok(())
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            f.write_str("/")?;
            match segment {
                Segment::Static(s) => f.write_str(s)?,
                Segment::Param(n) => write!(f, ":{}", n)?,
                Segment::CatchAll(n) => write!(f, "*{}", n)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        for raw in ["/", "/users", "/users/:id", "/files/*path", "/a/:b/c/", "/v1/:org/teams/:team"] {
            assert_eq!(Pattern::parse(raw).unwrap().to_string(), raw);
        }
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(Pattern::parse("users").is_err());
        assert!(Pattern::parse("/users/:").is_err());
        assert!(Pattern::parse("/files/*rest/more").is_err());
        assert!(Pattern::parse("/a/:id/b/:id").is_err());
        assert!(Pattern::parse("/a//b").is_err());
        assert!(Pattern::parse("/a/:bad-name").is_err());
    }

    #[test]
    fn test_to_matchit() {
        let p = Pattern::parse("/users/:id/files/*path").unwrap();
        assert_eq!(p.to_matchit(), "/users/{id}/files/{*path}");
        assert_eq!(Pattern::parse("/raw/{x}").unwrap().to_matchit(), "/raw/{{x}}");
    }

    #[test]
    fn test_to_regex() {
        let p = Pattern::parse("/users/:id").unwrap();
        let re = ::regex::Regex::new(&p.to_regex()).unwrap();
        let caps = re.captures("/users/42").unwrap();
        assert_eq!(&caps["id"], "42");
        assert!(!re.is_match("/users/42/extra"));

        let names: Vec<_> = p.param_names().collect();
        assert_eq!(names, vec!["id"]);
    }
}
