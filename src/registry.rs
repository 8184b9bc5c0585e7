use crate::config::schema::DispatcherConfig;
use crate::site::{CategoryExecutor, Site, SiteEntry};
use crate::sites::page::PageSite;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct CategoryEntry {
    executor: Option<Arc<dyn CategoryExecutor>>,
    sites: Vec<Site>,
}

/// Explicit mapping from categories to their executors and sites.
#[derive(Default)]
pub struct Registry {
    categories: HashMap<String, CategoryEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `site` to `category`. A site registered twice under the same name
    /// replaces the earlier one in place.
    pub fn register_site(&mut self, category: &str, site: Site) -> &mut Self {
        let entry = self.categories.entry(category.to_string()).or_default();
        match entry.sites.iter_mut().find(|s| s.name == site.name) {
            Some(existing) => {
                log::warn!("Site {}/{} registered twice; replacing", category, site.name);
                *existing = site;
            }
            None => entry.sites.push(site),
        }
        self
    }

    pub fn register_executor(
        &mut self,
        category: &str,
        executor: Arc<dyn CategoryExecutor>,
    ) -> &mut Self {
        self.categories
            .entry(category.to_string())
            .or_default()
            .executor = Some(executor);
        self
    }

    /// Registers a [`PageSite`] for every `pages` entry in the config.
    pub fn register_pages(&mut self, config: &DispatcherConfig) -> &mut Self {
        for category in &config.categories {
            for page in &category.pages {
                self.register_site(
                    &category.name,
                    Site::new(
                        page.name.clone(),
                        page.priority,
                        SiteEntry::structured(PageSite::new(page)),
                    ),
                );
            }
        }
        self
    }

    pub fn executor(&self, category: &str) -> Option<Arc<dyn CategoryExecutor>> {
        self.categories
            .get(category)
            .and_then(|entry| entry.executor.clone())
    }

    /// Sites in registration order.
    pub fn sites(&self, category: &str) -> &[Site] {
        self.categories
            .get(category)
            .map(|entry| entry.sites.as_slice())
            .unwrap_or(&[])
    }

    pub fn categories(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.categories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{CategoryConfig, PageSiteConfig};
    use crate::site::{CategoryOutcome, ScrapeContext};

    struct Noop;

    #[async_trait::async_trait]
    impl CategoryExecutor for Noop {
        async fn run(&self, _ctx: ScrapeContext, _sites: Option<Vec<String>>) -> anyhow::Result<CategoryOutcome> {
            Ok(CategoryOutcome::default())
        }
    }

    fn legacy(name: &str, priority: i32) -> Site {
        Site::new(name, priority, SiteEntry::blocking(|_| Ok(())))
    }

    #[test]
    fn sites_keep_registration_order() {
        let mut registry = Registry::new();
        registry
            .register_site("jobs", legacy("a", 0))
            .register_site("jobs", legacy("b", 5))
            .register_site("vehicles", legacy("c", 0));

        let names: Vec<&str> = registry.sites("jobs").iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(registry.sites("unknown").is_empty());
        assert_eq!(registry.categories(), vec!["jobs", "vehicles"]);
    }

    #[test]
    fn duplicate_site_replaces_previous() {
        let mut registry = Registry::new();
        registry
            .register_site("jobs", legacy("a", 0))
            .register_site("jobs", legacy("a", 9));

        assert_eq!(registry.sites("jobs").len(), 1);
        assert_eq!(registry.sites("jobs")[0].priority, 9);
    }

    #[test]
    fn executor_lookup() {
        let mut registry = Registry::new();
        registry.register_executor("jobs", Arc::new(Noop));
        assert!(registry.executor("jobs").is_some());
        assert!(registry.executor("vehicles").is_none());
    }

    #[test]
    fn pages_from_config_are_registered() {
        let mut category = CategoryConfig::new("news");
        category.pages.push(PageSiteConfig {
            name: "front".to_string(),
            priority: 3,
            urls: vec!["https://news.example.com/".to_string()],
        });
        let config = DispatcherConfig {
            categories: vec![category],
            ..DispatcherConfig::default()
        };

        let mut registry = Registry::new();
        registry.register_pages(&config);
        let sites = registry.sites("news");
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].name, "front");
        assert_eq!(sites[0].priority, 3);
        assert!(matches!(sites[0].entry, SiteEntry::Structured(_)));
    }
}
