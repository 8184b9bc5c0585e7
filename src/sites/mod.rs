pub mod page;

pub use page::{PageSite, domain_of};
