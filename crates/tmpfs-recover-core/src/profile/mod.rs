//! Kernel structure layouts
//!
//! Profiles are JSON symbol tables in the shape used by Volatility 3 (ISF):
//! base types, user types (structs and unions) with field offsets and type
//! descriptors, enums and symbol addresses. Only the subset needed to read
//! scalar fields, pointers, arrays and embedded structures is modelled.

use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{RecoveryError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub base_types: HashMap<String, BaseType>,
    #[serde(default)]
    pub user_types: HashMap<String, UserType>,
    #[serde(default)]
    pub enums: HashMap<String, EnumType>,
    #[serde(default)]
    pub symbols: HashMap<String, Symbol>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    #[default]
    Little,
    Big,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BaseType {
    pub size: u64,
    #[serde(default)]
    pub signed: bool,
    #[serde(default)]
    pub endian: Endian,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserType {
    pub size: u64,
    #[serde(default)]
    pub fields: HashMap<String, Field>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnumType {
    pub size: u64,
    #[serde(default)]
    pub base: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Field {
    pub offset: u64,
    #[serde(rename = "type")]
    pub type_info: TypeDescriptor,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Symbol {
    pub address: u64,
}

/// Type of a structure field
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TypeDescriptor {
    Base {
        name: String,
    },
    Pointer {
        #[serde(default)]
        subtype: Option<Box<TypeDescriptor>>,
    },
    Struct {
        name: String,
    },
    Union {
        name: String,
    },
    Enum {
        name: String,
    },
    Array {
        count: u64,
        subtype: Box<TypeDescriptor>,
    },
    Bitfield {
        bit_position: u32,
        bit_length: u32,
        #[serde(rename = "type")]
        underlying: Box<TypeDescriptor>,
    },
    #[serde(other)]
    Other,
}

impl Profile {
    /// Parse a profile from its JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a profile from a JSON file
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading profile {}", path.display()))?;
        let profile = Self::from_json_str(&text)
            .with_context(|| format!("parsing profile {}", path.display()))?;

        tracing::info!(
            "Loaded profile {} ({} types, {} symbols)",
            path.display(),
            profile.user_types.len(),
            profile.symbols.len()
        );

        Ok(profile)
    }

    pub fn user_type(&self, structure: &str) -> Result<&UserType> {
        self.user_types
            .get(structure)
            .ok_or_else(|| RecoveryError::UnknownStructure(structure.to_string()))
    }

    pub fn field(&self, structure: &str, field: &str) -> Result<&Field> {
        self.user_type(structure)?
            .fields
            .get(field)
            .ok_or_else(|| RecoveryError::UnknownField {
                structure: structure.to_string(),
                field: field.to_string(),
            })
    }

    pub fn has_field(&self, structure: &str, field: &str) -> bool {
        self.user_types
            .get(structure)
            .is_some_and(|t| t.fields.contains_key(field))
    }

    pub fn struct_size(&self, structure: &str) -> Result<u64> {
        Ok(self.user_type(structure)?.size)
    }

    pub fn symbol_address(&self, name: &str) -> Result<u64> {
        self.symbols
            .get(name)
            .map(|s| s.address)
            .ok_or_else(|| RecoveryError::UnknownSymbol(name.to_string()))
    }

    pub fn base_type(&self, name: &str) -> Option<&BaseType> {
        self.base_types.get(name)
    }

    /// Size of a pointer, 8 bytes unless the profile says otherwise
    pub fn pointer_size(&self) -> u64 {
        self.base_types.get("pointer").map_or(8, |p| p.size)
    }

    pub fn pointer_endian(&self) -> Endian {
        self.base_types
            .get("pointer")
            .map_or(Endian::Little, |p| p.endian)
    }

    /// Size in bytes of a value described by `descriptor`
    pub fn type_size(&self, descriptor: &TypeDescriptor) -> Option<u64> {
        match descriptor {
            TypeDescriptor::Base { name } => self.base_type(name).map(|b| b.size),
            TypeDescriptor::Pointer { .. } => Some(self.pointer_size()),
            TypeDescriptor::Struct { name } | TypeDescriptor::Union { name } => {
                self.user_types.get(name).map(|t| t.size)
            }
            TypeDescriptor::Enum { name } => self.enums.get(name).map(|e| e.size),
            TypeDescriptor::Array { count, subtype } => {
                self.type_size(subtype).map(|size| size * count)
            }
            TypeDescriptor::Bitfield { underlying, .. } => self.type_size(underlying),
            TypeDescriptor::Other => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = r#"{
        "metadata": { "format": "6.2.0" },
        "base_types": {
            "pointer": { "kind": "int", "size": 8, "signed": false, "endian": "little" },
            "unsigned short": { "kind": "int", "size": 2, "signed": false, "endian": "little" },
            "long long": { "kind": "int", "size": 8, "signed": true, "endian": "little" }
        },
        "user_types": {
            "radix_tree_node": {
                "kind": "struct",
                "size": 528,
                "fields": {
                    "height": { "offset": 0, "type": { "kind": "base", "name": "unsigned int" } },
                    "slots": { "offset": 16, "type": { "kind": "array", "count": 64,
                        "subtype": { "kind": "pointer", "subtype": { "kind": "base", "name": "void" } } } },
                    "rcu_head": { "offset": 8, "type": { "kind": "function" } }
                }
            }
        },
        "enums": {},
        "symbols": { "mem_map": { "address": 18446744071590000000 } }
    }"#;

    #[test]
    fn test_parse_isf_subset() {
        let profile = Profile::from_json_str(PROFILE).unwrap();

        assert_eq!(profile.struct_size("radix_tree_node").unwrap(), 528);
        assert_eq!(profile.field("radix_tree_node", "slots").unwrap().offset, 16);
        assert_eq!(profile.pointer_size(), 8);
        assert!(profile.has_field("radix_tree_node", "height"));
        assert!(!profile.has_field("radix_tree_node", "shift"));
        assert_eq!(
            profile.symbol_address("mem_map").unwrap(),
            18446744071590000000
        );
    }

    #[test]
    fn test_type_sizes() {
        let profile = Profile::from_json_str(PROFILE).unwrap();
        let slots = &profile.field("radix_tree_node", "slots").unwrap().type_info;
        assert_eq!(profile.type_size(slots), Some(512));

        let unknown = &profile.field("radix_tree_node", "rcu_head").unwrap().type_info;
        assert_eq!(unknown, &TypeDescriptor::Other);
        assert_eq!(profile.type_size(unknown), None);
    }

    #[test]
    fn test_unknown_names() {
        let profile = Profile::from_json_str(PROFILE).unwrap();
        assert!(matches!(
            profile.field("dentry", "d_name"),
            Err(RecoveryError::UnknownStructure(_))
        ));
        assert!(matches!(
            profile.field("radix_tree_node", "count"),
            Err(RecoveryError::UnknownField { .. })
        ));
        assert!(matches!(
            profile.symbol_address("init_task"),
            Err(RecoveryError::UnknownSymbol(_))
        ));
    }
}
