// Copyright 2024 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Lowering of a system description into placeholder bindings.
//!
//! The resolver owns every validation rule that needs knowledge beyond a
//! single value's textual shape: counts, subject uniqueness, address
//! alignment against the configured per-CPU region size, and VMX region
//! placement. Rendering re-checks plain representations, but only the
//! resolver can check these.

use std::collections::HashSet;

use log::debug;

use crate::config::SystemConfig;
use crate::template::{Bindings, PAGE_SIZE, Placeholder};

#[rustfmt::skip]
#[derive(Debug, PartialEq, Eq, thiserror::Error, displaydoc::Display)]
pub enum ResolveError {
    /// CPU count must be at least 1.
    ZeroCpuCount,
    /// At least one subject is required.
    NoSubjects,
    /// Subject names must not be empty.
    EmptySubjectName,
    /// Duplicate subject name: {0}.
    DuplicateSubject(String),
    /// {0} address {1:#x} is not aligned to {2:#x}.
    Unaligned(&'static str, u64, u64),
    /// Per-CPU region size {0:#x} is not a non-zero power of two.
    BadPercpuSize(u64),
    /// VMXON region {0:#x} and VMCS region {1:#x} share a page.
    VmxRegionOverlap(u64, u64),
}

/// Validates `config` and lowers it into the complete binding set.
///
/// The returned bindings cover every placeholder; a partial set cannot be
/// produced.
pub fn resolve(config: &SystemConfig) -> Result<Bindings, ResolveError> {
    validate(config)?;

    let mut bindings = Bindings::new();
    bindings.bind(Placeholder::CpuCount, config.cpu.count.to_string());
    bindings.bind(
        Placeholder::StackAddr,
        format!("{:x}", config.memory.kernel_stack),
    );
    bindings.bind(
        Placeholder::Kpml4Addr,
        format!("{:x}", config.memory.kernel_pml4),
    );
    bindings.bind(
        Placeholder::CpuStoreAddr,
        format!("{:x}", config.memory.percpu.base),
    );
    bindings.bind(Placeholder::SubjCount, config.subjects.len().to_string());
    bindings.bind(Placeholder::VmxonAddr, format!("{:x}", config.memory.vmxon));
    bindings.bind(Placeholder::VmcsAddr, format!("{:x}", config.memory.vmcs));

    debug!(
        "resolved bindings for {} CPU(s), {} subject(s)",
        config.cpu.count,
        config.subjects.len()
    );

    Ok(bindings)
}

fn validate(config: &SystemConfig) -> Result<(), ResolveError> {
    if config.cpu.count == 0 {
        return Err(ResolveError::ZeroCpuCount);
    }

    if config.subjects.is_empty() {
        return Err(ResolveError::NoSubjects);
    }
    let mut names = HashSet::new();
    for subject in &config.subjects {
        if subject.name.is_empty() {
            return Err(ResolveError::EmptySubjectName);
        }
        if !names.insert(subject.name.as_str()) {
            return Err(ResolveError::DuplicateSubject(subject.name.clone()));
        }
    }

    let memory = &config.memory;
    for (field, addr) in [
        ("kernel page table", memory.kernel_pml4),
        ("VMXON", memory.vmxon),
        ("VMCS", memory.vmcs),
    ] {
        if addr % PAGE_SIZE != 0 {
            return Err(ResolveError::Unaligned(field, addr, PAGE_SIZE));
        }
    }

    let percpu = &memory.percpu;
    if percpu.size == 0 || !percpu.size.is_power_of_two() {
        return Err(ResolveError::BadPercpuSize(percpu.size));
    }
    if percpu.base % percpu.size != 0 {
        return Err(ResolveError::Unaligned(
            "per-CPU store",
            percpu.base,
            percpu.size,
        ));
    }

    // VMXON and VMCS addresses are page-aligned at this point, so distinct
    // pages means distinct addresses.
    if memory.vmxon == memory.vmcs {
        return Err(ResolveError::VmxRegionOverlap(memory.vmxon, memory.vmcs));
    }

    Ok(())
}
