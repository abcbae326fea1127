//! # Render Module
//!
//! Response rendering on top of [minijinja](https://docs.rs/minijinja).
//!
//! [`Renderer`] writes HTML from template files, JSON from any `Serialize`
//! value, and plain status/message bodies. Template sets are named by their
//! file names relative to the template directory; the first name is the
//! entry point and the rest are available to it by base name (layouts,
//! includes).
//!
//! Every template sees these functions:
//!
//! | function                 | result                                       |
//! |--------------------------|----------------------------------------------|
//! | `host(request)`          | host the request was sent to                 |
//! | `marshal(value)`         | JSON safe to embed in a `<script>` block     |
//! | `partial(name, payload)` | renders `partials/<name>` with `payload`     |
//! | `title(text)`            | capitalizes each word                        |
//! | `gravatar(email, size)`  | Gravatar URL for the address                 |
//!
//! and these variables, overridable by the caller's data:
//!
//! - `config`: the application config bag, when the renderer has one
//! - `request`: `host`, `method`, `path` and `uri` of the current request
//!
//! Rendering never panics or propagates: failures become a 500 response
//! carrying the error text.

mod cache;
mod functions;
mod message;
mod renderer;

use std::path::PathBuf;
use thiserror::Error;

pub use self::cache::{CompiledTemplate, TemplateCache};
pub use self::message::MessageRenderer;
pub use self::renderer::{Renderer, TEMPLATE_REQUIRED_BODY};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template identifiers required to render")]
    NoTemplates,
    #[error("failed to read template {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Template(#[from] minijinja::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("template data must serialize to a map")]
    NotAMap,
}
