use std::collections::HashMap;
use std::hash::BuildHasher;

/// Path to literal response body.
pub type RouteMap = HashMap<String, String>;

/// Read access to a route map.
pub trait Routes {
    fn lookup(&self, path: &str) -> Option<&str>;
}

impl<S: BuildHasher> Routes for HashMap<String, String, S> {
    fn lookup(&self, path: &str) -> Option<&str> {
        self.get(path).map(String::as_str)
    }
}

/// A per-tick overlay on top of the persistent routes. Overlay entries win.
pub struct Layered<'a> {
    pub base: &'a RouteMap,
    pub overlay: &'a RouteMap,
}

impl Routes for Layered<'_> {
    fn lookup(&self, path: &str) -> Option<&str> {
        self.overlay
            .lookup(path)
            .or_else(|| self.base.lookup(path))
    }
}

/// The routes a server starts with: the root path with an empty body.
pub fn default_routes() -> RouteMap {
    RouteMap::from([("/".to_string(), String::new())])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_wins() {
        let base = RouteMap::from([
            ("/".to_string(), "base".to_string()),
            ("/a".to_string(), "a".to_string()),
        ]);
        let overlay = RouteMap::from([("/".to_string(), "live".to_string())]);
        let routes = Layered {
            base: &base,
            overlay: &overlay,
        };

        assert_eq!(routes.lookup("/"), Some("live"));
        assert_eq!(routes.lookup("/a"), Some("a"));
        assert_eq!(routes.lookup("/b"), None);
    }
}
