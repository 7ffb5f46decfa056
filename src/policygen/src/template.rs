// Copyright 2024 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Placeholder substitution over policy header templates.
//!
//! A template is plain text containing `__name__` tokens. Rendering replaces
//! every recognized token with the textual value bound to it and leaves all
//! other bytes untouched. Where the template reads `0x__stack_addr__`, the
//! `0x` prefix is template text and the binding carries hex digits only.

use std::collections::HashMap;
use std::fmt;

/// Alignment required of page-table and VMX structure addresses.
pub const PAGE_SIZE: u64 = 0x1000;

/// Subject policy template compiled into the binary, used when no template
/// file is given on the command line.
pub const DEFAULT_TEMPLATE: &str = include_str!("../resources/policy_template.h");

/// The fixed set of substitution points a subject policy template may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// Number of physical CPUs.
    CpuCount,
    /// Kernel stack base address.
    StackAddr,
    /// Kernel top-level page table address.
    Kpml4Addr,
    /// Per-CPU storage region base address.
    CpuStoreAddr,
    /// Number of schedulable subjects.
    SubjCount,
    /// VMXON region physical address.
    VmxonAddr,
    /// VMCS region physical address.
    VmcsAddr,
}

/// Expected textual representation of a bound value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    /// Unsigned decimal integer, at least 1.
    Count,
    /// Hex digits fitting a 64-bit address, aligned to the given boundary.
    Addr { align: Option<u64> },
}

impl Placeholder {
    /// All placeholders, in template order.
    pub const ALL: [Placeholder; 7] = [
        Placeholder::CpuCount,
        Placeholder::StackAddr,
        Placeholder::Kpml4Addr,
        Placeholder::CpuStoreAddr,
        Placeholder::SubjCount,
        Placeholder::VmxonAddr,
        Placeholder::VmcsAddr,
    ];

    /// Token name without the surrounding underscores.
    pub fn name(self) -> &'static str {
        match self {
            Placeholder::CpuCount => "cpu_count",
            Placeholder::StackAddr => "stack_addr",
            Placeholder::Kpml4Addr => "kpml4_addr",
            Placeholder::CpuStoreAddr => "cpu_store_addr",
            Placeholder::SubjCount => "subj_count",
            Placeholder::VmxonAddr => "vmxon_addr",
            Placeholder::VmcsAddr => "vmcs_addr",
        }
    }

    fn from_name(name: &str) -> Option<Placeholder> {
        Placeholder::ALL.into_iter().find(|p| p.name() == name)
    }

    fn kind(self) -> ValueKind {
        match self {
            Placeholder::CpuCount | Placeholder::SubjCount => ValueKind::Count,
            // Alignment of the per-CPU store depends on the region size,
            // which only the resolver knows.
            Placeholder::StackAddr | Placeholder::CpuStoreAddr => ValueKind::Addr { align: None },
            Placeholder::Kpml4Addr | Placeholder::VmxonAddr | Placeholder::VmcsAddr => {
                ValueKind::Addr {
                    align: Some(PAGE_SIZE),
                }
            }
        }
    }

    /// Checks that `value` matches the representation this placeholder
    /// expects in rendered output.
    fn check_value(self, value: &str) -> Result<(), RenderError> {
        let malformed =
            |reason: &str| RenderError::MalformedValue(self, value.to_string(), reason.to_string());

        match self.kind() {
            ValueKind::Count => {
                if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(malformed("expected an unsigned decimal integer"));
                }
                let count = value
                    .parse::<u64>()
                    .map_err(|_| malformed("exceeds the 64-bit range"))?;
                if count == 0 {
                    return Err(malformed("count must be at least 1"));
                }
            }
            ValueKind::Addr { align } => {
                if value.is_empty() || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(malformed("expected hexadecimal digits"));
                }
                if value.len() > 16 {
                    return Err(malformed("exceeds the 64-bit address range"));
                }
                // Infallible given the checks above.
                let addr = u64::from_str_radix(value, 16).unwrap();
                if let Some(align) = align {
                    if addr % align != 0 {
                        return Err(malformed("address is not page-aligned"));
                    }
                }
            }
        }

        Ok(())
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "__{}__", self.name())
    }
}

#[rustfmt::skip]
#[derive(Debug, PartialEq, Eq, thiserror::Error, displaydoc::Display)]
pub enum RenderError {
    /// No value bound for placeholder {0}.
    MissingBinding(Placeholder),
    /// Malformed value {1:?} for placeholder {0}: {2}.
    MalformedValue(Placeholder, String, String),
    /// Unrecognized placeholder `__{0}__` in template.
    UnknownPlaceholder(String),
}

/// The values substituted into a template during one generation run.
///
/// Built once by the resolver, consumed by [`render`], then discarded.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Bindings(HashMap<Placeholder, String>);

impl Bindings {
    pub fn new() -> Self {
        Bindings::default()
    }

    /// Binds `value` to `placeholder`, replacing any previous binding.
    pub fn bind<S: Into<String>>(&mut self, placeholder: Placeholder, value: S) {
        self.0.insert(placeholder, value.into());
    }

    pub fn get(&self, placeholder: Placeholder) -> Option<&str> {
        self.0.get(&placeholder).map(String::as_str)
    }
}

// Token names are lowercase identifiers. Uppercase dunder idioms such as
// include guards (`__POLICY_H__`) are template text, not tokens.
fn is_token_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

/// Renders `template` against `bindings`.
///
/// Single-pass, pure transform: every recognized `__name__` token is
/// replaced by its bound value, every other byte is copied through
/// unchanged. Rendering the same inputs twice yields byte-identical
/// output.
pub fn render(template: &str, bindings: &Bindings) -> Result<String, RenderError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("__") {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 2..];

        // The closing delimiter is the next `__`, so a token name can never
        // contain a doubled underscore.
        match tail.find("__").filter(|&end| is_token_name(&tail[..end])) {
            Some(end) => {
                let name = &tail[..end];
                let placeholder = Placeholder::from_name(name)
                    .ok_or_else(|| RenderError::UnknownPlaceholder(name.to_string()))?;
                let value = bindings
                    .get(placeholder)
                    .ok_or(RenderError::MissingBinding(placeholder))?;
                placeholder.check_value(value)?;
                out.push_str(value);
                rest = &tail[end + 2..];
            }
            None => {
                // A `__` that does not open a token is ordinary text.
                out.push_str("__");
                rest = tail;
            }
        }
    }

    out.push_str(rest);
    Ok(out)
}
