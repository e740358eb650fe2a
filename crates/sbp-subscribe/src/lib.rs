//! Subscription ingestion and share-link codec for the panel.
//!
//! Feeds arrive as sing-box JSON, Clash YAML, base64 blobs or plain link
//! lists; everything normalizes into sing-box outbound dictionaries the
//! store can hold and the probing engine can address by tag. The reverse
//! direction renders rows back into share links for client subscriptions.

mod clash;
mod fetch;
mod links;
mod model;
mod parse;
mod share;

pub use fetch::fetch_subscription;
pub use links::decode_link;
pub use model::{Format, OutboundMap, ParseOutcome, SubsError};
pub use parse::{parse_links, parse_singbox, parse_subscription};
pub use share::outbound_to_link;
