// Copyright 2024 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! policygen generates the per-subject policy header compiled into a
//! separation kernel, by substituting placeholder tokens in a header
//! template with values resolved from a JSON system description.
//!
//! ```text
//! The generation goes through a couple of steps, from JSON to header:
//!
//!     JSON system description
//!              |
//!        (via serde_json)
//!              |
//!              V
//!        `SystemConfig`
//!              |
//!     (via resolver::resolve)
//!              |
//!              V
//!         `Bindings`
//!              |
//!     (via template::render, together with the template text)
//!              |
//!              V
//!      finished policy header
//! ```
//!
//! Generation fails closed: every error in the pipeline surfaces before
//! any output is produced, so callers never observe a partially
//! substituted header.

pub mod config;
pub mod logger;
pub mod resolver;
pub mod template;

pub use config::SystemConfig;
pub use resolver::ResolveError;
pub use template::{Bindings, DEFAULT_TEMPLATE, Placeholder, RenderError};

#[derive(Debug, PartialEq, Eq, thiserror::Error, displaydoc::Display)]
pub enum GenerateError {
    /// Failed to resolve system description: {0}
    Resolve(#[from] ResolveError),
    /// Failed to render template: {0}
    Render(#[from] RenderError),
}

/// Renders `template` against the bindings resolved from `config`.
pub fn generate(template: &str, config: &SystemConfig) -> Result<String, GenerateError> {
    let bindings = resolver::resolve(config)?;
    Ok(template::render(template, &bindings)?)
}
