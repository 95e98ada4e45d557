//! Typed access to kernel data structures inside a memory capture
//!
//! The recovery code never interprets raw structure layouts itself. It asks a
//! [`KernelMemory`] for named fields of named structures, and the profile
//! decides where those fields live and how wide they are.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{RecoveryError, Result};
use crate::memory::VirtualMemory;
use crate::profile::{Endian, Profile, TypeDescriptor};

mod dentry;
mod inode;
mod list;
mod mount;

pub use dentry::{Dentry, MAX_NAME_LEN};
pub use inode::InodeView;
pub use list::{list_entries, list_entries_bounded, MAX_LIST_ENTRIES};
pub use mount::{KernelMountTable, MountEntry, MountSource, StaticMountTable};

/// A value read from a structure field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Unsigned(u64),
    Signed(i64),
    Pointer(u64),
    /// Structure or union stored inline; carries its type and address
    Embedded { type_name: String, address: u64 },
    /// Inline array; carries its address and element count
    Array { address: u64, count: u64 },
}

impl FieldValue {
    /// Scalar value, or the address of an inline aggregate
    pub fn as_u64(&self) -> u64 {
        match self {
            FieldValue::Unsigned(v) | FieldValue::Pointer(v) => *v,
            FieldValue::Signed(v) => *v as u64,
            FieldValue::Embedded { address, .. } | FieldValue::Array { address, .. } => *address,
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            FieldValue::Signed(v) => *v,
            other => other.as_u64() as i64,
        }
    }
}

/// Typed accessor over kernel memory
pub trait KernelMemory {
    /// Read `structure.field` of the structure instance at `address`
    fn read_field(&self, structure: &str, field: &str, address: u64) -> Result<FieldValue>;

    /// Read a NUL-terminated string of at most `max_length` bytes
    fn dereference_string(&self, address: u64, max_length: usize) -> Result<Vec<u8>>;

    fn field_offset(&self, structure: &str, field: &str) -> Result<u64>;

    fn size_of(&self, structure: &str) -> Result<u64>;

    fn has_field(&self, structure: &str, field: &str) -> bool;

    fn symbol_address(&self, name: &str) -> Result<u64>;

    /// Read a raw pointer-sized value at `address`
    fn read_pointer(&self, address: u64) -> Result<u64>;

    fn pointer_size(&self) -> u64;

    fn read_u64(&self, structure: &str, field: &str, address: u64) -> Result<u64> {
        Ok(self.read_field(structure, field, address)?.as_u64())
    }

    /// Type name and address of an inline structure field
    fn embedded(&self, structure: &str, field: &str, address: u64) -> Result<(String, u64)> {
        match self.read_field(structure, field, address)? {
            FieldValue::Embedded { type_name, address } => Ok((type_name, address)),
            _ => Err(RecoveryError::UnsupportedFieldType {
                structure: structure.to_string(),
                field: field.to_string(),
            }),
        }
    }
}

/// [`KernelMemory`] backed by a [`Profile`] and a kernel virtual address space
pub struct ProfiledMemory<'a, V> {
    profile: &'a Profile,
    space: &'a V,
}

impl<'a, V: VirtualMemory> ProfiledMemory<'a, V> {
    pub fn new(profile: &'a Profile, space: &'a V) -> Self {
        Self { profile, space }
    }

    fn read_int(
        &self,
        address: u64,
        size: u64,
        signed: bool,
        endian: Endian,
    ) -> Result<Option<FieldValue>> {
        if size == 0 || size > 8 {
            return Ok(None);
        }
        let bytes = self.space.read_virtual(address, size as usize)?;
        let n = size as usize;
        let value = match (endian, signed) {
            (Endian::Little, false) => FieldValue::Unsigned(LittleEndian::read_uint(&bytes, n)),
            (Endian::Big, false) => FieldValue::Unsigned(BigEndian::read_uint(&bytes, n)),
            (Endian::Little, true) => FieldValue::Signed(LittleEndian::read_int(&bytes, n)),
            (Endian::Big, true) => FieldValue::Signed(BigEndian::read_int(&bytes, n)),
        };
        Ok(Some(value))
    }

    fn read_typed(&self, descriptor: &TypeDescriptor, address: u64) -> Result<Option<FieldValue>> {
        match descriptor {
            TypeDescriptor::Base { name } => match self.profile.base_type(name) {
                Some(base) => self.read_int(address, base.size, base.signed, base.endian),
                None => Ok(None),
            },
            TypeDescriptor::Pointer { .. } => {
                Ok(Some(FieldValue::Pointer(self.read_pointer(address)?)))
            }
            TypeDescriptor::Enum { name } => {
                let Some(size) = self.profile.type_size(descriptor) else {
                    return Ok(None);
                };
                // Signedness and byte order follow the enum's base type when named
                let (signed, endian) = self
                    .profile
                    .enums
                    .get(name)
                    .and_then(|e| e.base.as_deref())
                    .and_then(|base| self.profile.base_type(base))
                    .map_or((false, self.profile.pointer_endian()), |b| (b.signed, b.endian));
                self.read_int(address, size, signed, endian)
            }
            TypeDescriptor::Struct { name } | TypeDescriptor::Union { name } => {
                Ok(Some(FieldValue::Embedded {
                    type_name: name.clone(),
                    address,
                }))
            }
            TypeDescriptor::Array { count, .. } => Ok(Some(FieldValue::Array {
                address,
                count: *count,
            })),
            TypeDescriptor::Bitfield {
                bit_position,
                bit_length,
                underlying,
            } => {
                let raw = match self.read_typed(underlying, address)? {
                    Some(value) => value.as_u64(),
                    None => return Ok(None),
                };
                let shifted = raw.checked_shr(*bit_position).unwrap_or(0);
                let mask = match bit_length {
                    0 => 0,
                    n if *n >= 64 => u64::MAX,
                    n => (1u64 << n) - 1,
                };
                Ok(Some(FieldValue::Unsigned(shifted & mask)))
            }
            TypeDescriptor::Other => Ok(None),
        }
    }
}

impl<'a, V: VirtualMemory> KernelMemory for ProfiledMemory<'a, V> {
    fn read_field(&self, structure: &str, field: &str, address: u64) -> Result<FieldValue> {
        let info = self.profile.field(structure, field)?;
        self.read_typed(&info.type_info, address.wrapping_add(info.offset))?
            .ok_or_else(|| RecoveryError::UnsupportedFieldType {
                structure: structure.to_string(),
                field: field.to_string(),
            })
    }

    fn dereference_string(&self, address: u64, max_length: usize) -> Result<Vec<u8>> {
        if address == 0 || max_length == 0 {
            return Ok(Vec::new());
        }
        let mut bytes = self.space.read_virtual(address, max_length)?;
        if let Some(nul) = bytes.iter().position(|&b| b == 0) {
            bytes.truncate(nul);
        }
        Ok(bytes)
    }

    fn field_offset(&self, structure: &str, field: &str) -> Result<u64> {
        Ok(self.profile.field(structure, field)?.offset)
    }

    fn size_of(&self, structure: &str) -> Result<u64> {
        self.profile.struct_size(structure)
    }

    fn has_field(&self, structure: &str, field: &str) -> bool {
        self.profile.has_field(structure, field)
    }

    fn symbol_address(&self, name: &str) -> Result<u64> {
        self.profile.symbol_address(name)
    }

    fn read_pointer(&self, address: u64) -> Result<u64> {
        let size = self.profile.pointer_size() as usize;
        let bytes = self.space.read_virtual(address, size)?;
        Ok(match self.profile.pointer_endian() {
            Endian::Little => LittleEndian::read_uint(&bytes, size),
            Endian::Big => BigEndian::read_uint(&bytes, size),
        })
    }

    fn pointer_size(&self) -> u64 {
        self.profile.pointer_size()
    }
}
