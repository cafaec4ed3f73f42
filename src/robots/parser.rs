//! Robots.txt parsing, wrapping the robotstxt crate

use robotstxt::DefaultMatcher;

/// Parsed robots.txt data
///
/// A thin wrapper around the robotstxt matcher. Matching happens on demand
/// against the stored content; an empty or unfetchable robots.txt allows
/// everything.
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    content: String,
    allow_all: bool,
}

impl ParsedRobots {
    /// Creates a ParsedRobots from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: false,
        }
    }

    /// Creates a permissive ParsedRobots that allows everything
    ///
    /// Used as the default when robots.txt cannot be fetched.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
        }
    }

    /// Checks if a URL is allowed for the given user agent
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.allow_all || self.content.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all_permits_everything() {
        let robots = ParsedRobots::allow_all();
        assert!(robots.is_allowed("https://example.com/any/path", "DredgeBot"));
    }

    #[test]
    fn test_empty_content_permits_everything() {
        let robots = ParsedRobots::from_content("");
        assert!(robots.is_allowed("https://example.com/", "DredgeBot"));
    }

    #[test]
    fn test_disallow_path() {
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow: /admin");
        assert!(!robots.is_allowed("https://example.com/admin/panel", "DredgeBot"));
        assert!(robots.is_allowed("https://example.com/public", "DredgeBot"));
    }

    #[test]
    fn test_agent_specific_rules() {
        let robots = ParsedRobots::from_content(
            "User-agent: DredgeBot\nDisallow: /private\n\nUser-agent: *\nDisallow:",
        );
        assert!(!robots.is_allowed("https://example.com/private", "DredgeBot"));
        assert!(robots.is_allowed("https://example.com/private", "OtherBot"));
    }
}
