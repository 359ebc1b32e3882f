//! App cast model, serializers, filters and fetchers.

mod error;
mod fetch;
mod filter;
mod item;
mod json;
mod serializer;
mod version;
mod xml;

pub use error::AppCastError;
pub use fetch::{
    AppCastDataDownloader, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, HttpOptions,
    LocalFileAppCastDataDownloader, RedirectHook, WebRequestAppCastDataDownloader,
    redirect_policy, refuse_https_downgrade,
};
pub use filter::{AppCastFilter, ChannelAppCastFilter, DefaultAppCastFilter};
pub use item::{AppCast, AppCastItem, DEFAULT_OPERATING_SYSTEM, sort_newest_first};
pub use json::JsonAppCastSerializer;
pub use serializer::AppCastSerializer;
pub use version::{SemVerLike, VersionParseError, is_newer_version};
pub use xml::{SPARKLE_NAMESPACE, XmlAppCastSerializer, parse_pub_date};
