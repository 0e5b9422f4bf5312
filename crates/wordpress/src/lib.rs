//! WordPress plugin for hookgate.
//!
//! The site widget posts `{message, visitorId, siteUrl}` for every visitor
//! message. There is no signature scheme; the optional `siteUrl` setting keeps
//! one integration from claiming another site's traffic.

mod plugin;

pub use plugin::{WidgetMessage, WordPressPlugin, WordPressSettings, normalize_site_url};
