//! Crawling: per-crawl state machines, the process-wide registry, sitemap
//! seeding, and the controller task that coordinates them.

mod controller;
mod registry;
mod sitemap;
mod state;

pub use controller::{ControllerContext, CrawlController, CrawlEvent};
pub use registry::{CrawlHandle, CrawlRegistry, CrawlSnapshot};
pub use sitemap::discover_sitemap_urls;
pub use state::{CrawlState, CrawlStatus};
