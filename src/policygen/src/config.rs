// Copyright 2024 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! System description parsing.
//!
//! The system description is a JSON document stating the static
//! configuration a policy header is generated from: CPU topology, the
//! kernel memory layout, and the subject list. Addresses and region sizes
//! are strings in `0x` (hex) or `0b` (binary) prefixed form; counts are
//! plain JSON numbers.
//!
//! ```text
//! {
//!     "cpu": { "count": 4 },
//!     "memory": {
//!         "kernel_stack": "0x112000",
//!         "kernel_pml4": "0x200000",
//!         "percpu": { "base": "0x1fe000", "size": "0x2000" },
//!         "vmxon": "0x204000",
//!         "vmcs": "0x208000"
//!     },
//!     "subjects": [ { "name": "vt" }, { "name": "nic_linux" } ]
//! }
//! ```

use std::fmt::Debug;
use std::io::Read;

use serde::de::Error as SerdeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Static configuration a policy header is generated from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SystemConfig {
    /// Physical CPU topology.
    pub cpu: CpuTopology,
    /// Kernel memory layout.
    pub memory: MemoryLayout,
    /// Schedulable subjects, in scheduling order.
    pub subjects: Vec<Subject>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CpuTopology {
    /// Number of physical CPUs.
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryLayout {
    /// Kernel stack base address.
    #[serde(
        deserialize_with = "deserialize_from_str_u64",
        serialize_with = "serialize_to_hex_str"
    )]
    pub kernel_stack: u64,
    /// Kernel top-level page table address.
    #[serde(
        deserialize_with = "deserialize_from_str_u64",
        serialize_with = "serialize_to_hex_str"
    )]
    pub kernel_pml4: u64,
    /// Per-CPU storage region.
    pub percpu: PercpuRegion,
    /// VMXON region physical address.
    #[serde(
        deserialize_with = "deserialize_from_str_u64",
        serialize_with = "serialize_to_hex_str"
    )]
    pub vmxon: u64,
    /// VMCS region physical address.
    #[serde(
        deserialize_with = "deserialize_from_str_u64",
        serialize_with = "serialize_to_hex_str"
    )]
    pub vmcs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PercpuRegion {
    /// Region base address.
    #[serde(
        deserialize_with = "deserialize_from_str_u64",
        serialize_with = "serialize_to_hex_str"
    )]
    pub base: u64,
    /// Region size in bytes. Also the alignment of `base`.
    #[serde(
        deserialize_with = "deserialize_from_str_u64",
        serialize_with = "serialize_to_hex_str"
    )]
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Subject {
    /// Subject name, unique within the system.
    pub name: String,
}

impl SystemConfig {
    /// Parses a system description from a JSON reader.
    pub fn from_reader<R: Read>(reader: R) -> Result<SystemConfig, serde_json::Error> {
        serde_json::from_reader(reader)
    }
}

/// Serializes a number to a `0x` prefixed hex string.
pub fn serialize_to_hex_str<S, N>(number: &N, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    N: std::fmt::LowerHex + Debug,
{
    serializer.serialize_str(format!("{:#x}", number).as_str())
}

/// Deserializes a number from a string in binary or hex form.
pub fn deserialize_from_str_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let number_str = String::deserialize(deserializer)?;
    let deserialized_number = if let Some(s) = number_str.strip_prefix("0b") {
        u64::from_str_radix(s, 2)
    } else if let Some(s) = number_str.strip_prefix("0x") {
        u64::from_str_radix(s, 16)
    } else {
        return Err(D::Error::custom(format!(
            "No supported number system prefix found in value [{}]. Make sure to prefix the \
             number with '0x' for hexadecimal numbers or '0b' for binary numbers.",
            number_str,
        )));
    }
    .map_err(|err| {
        D::Error::custom(format!(
            "Failed to parse string [{}] as an address - {:?}",
            number_str, err
        ))
    })?;
    Ok(deserialized_number)
}
