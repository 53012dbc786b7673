use std::io::{Read, Seek};

use binrw::{binread, BinRead};

use crate::error::{DecompileError, Result};
use crate::visitor::{CallSite, Constant, ConstantDynamic, FieldRef, Handle, MethodRef};

/// Resolves the symbolic operands of instructions.
///
/// Indices are the raw 1-based constant pool indices found in the code.
pub trait ConstantPool {
    fn utf8(&self, index: u16) -> Result<&str>;

    /// Internal name behind a `CONSTANT_Class` entry.
    fn class_name(&self, index: u16) -> Result<&str>;

    /// A loadable constant, as used by `ldc` and bootstrap arguments.
    fn constant(&self, index: u16) -> Result<Constant>;

    fn field_ref(&self, index: u16) -> Result<FieldRef>;

    /// A `Methodref` or `InterfaceMethodref`.
    fn method_ref(&self, index: u16) -> Result<MethodRef>;

    /// The `InvokeDynamic` entry of an `invokedynamic` instruction.
    fn call_site(&self, index: u16) -> Result<CallSite>;
}

/// A decoded constant pool entry.
#[derive(Clone, Debug, PartialEq)]
pub enum PoolEntry {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class { name_index: u16 },
    String { string_index: u16 },
    FieldRef { class_index: u16, name_and_type_index: u16 },
    MethodRef { class_index: u16, name_and_type_index: u16 },
    InterfaceMethodRef { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    MethodHandle { reference_kind: u8, reference_index: u16 },
    MethodType { descriptor_index: u16 },
    Dynamic { bootstrap_index: u16, name_and_type_index: u16 },
    InvokeDynamic { bootstrap_index: u16, name_and_type_index: u16 },
    Module { name_index: u16 },
    Package { name_index: u16 },
    /// The slot after a `Long` or `Double`.
    Unusable,
}

impl PoolEntry {
    fn is_wide(&self) -> bool {
        matches!(self, PoolEntry::Long(_) | PoolEntry::Double(_))
    }
}

#[binread]
#[br(big)]
enum RawEntry {
    #[br(magic = 1u8)]
    Utf8(#[br(parse_with = modified_utf8)] String),
    #[br(magic = 3u8)]
    Integer(i32),
    #[br(magic = 4u8)]
    Float(f32),
    #[br(magic = 5u8)]
    Long(i64),
    #[br(magic = 6u8)]
    Double(f64),
    #[br(magic = 7u8)]
    Class(u16),
    #[br(magic = 8u8)]
    String(u16),
    #[br(magic = 9u8)]
    FieldRef(u16, u16),
    #[br(magic = 10u8)]
    MethodRef(u16, u16),
    #[br(magic = 11u8)]
    InterfaceMethodRef(u16, u16),
    #[br(magic = 12u8)]
    NameAndType(u16, u16),
    #[br(magic = 15u8)]
    MethodHandle(u8, u16),
    #[br(magic = 16u8)]
    MethodType(u16),
    #[br(magic = 17u8)]
    Dynamic(u16, u16),
    #[br(magic = 18u8)]
    InvokeDynamic(u16, u16),
    #[br(magic = 19u8)]
    Module(u16),
    #[br(magic = 20u8)]
    Package(u16),
}

// Modified UTF-8 only differs from UTF-8 in how NUL and supplementary
// characters are encoded. Those decode lossily.
#[binrw::parser(reader, endian)]
fn modified_utf8() -> binrw::BinResult<String> {
    let length = u16::read_options(reader, endian, ())?;
    let mut bytes = vec![0; usize::from(length)];
    reader.read_exact(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

impl From<RawEntry> for PoolEntry {
    fn from(raw: RawEntry) -> Self {
        match raw {
            RawEntry::Utf8(value) => PoolEntry::Utf8(value),
            RawEntry::Integer(value) => PoolEntry::Integer(value),
            RawEntry::Float(value) => PoolEntry::Float(value),
            RawEntry::Long(value) => PoolEntry::Long(value),
            RawEntry::Double(value) => PoolEntry::Double(value),
            RawEntry::Class(name_index) => PoolEntry::Class { name_index },
            RawEntry::String(string_index) => PoolEntry::String { string_index },
            RawEntry::FieldRef(class_index, name_and_type_index) => PoolEntry::FieldRef {
                class_index,
                name_and_type_index,
            },
            RawEntry::MethodRef(class_index, name_and_type_index) => PoolEntry::MethodRef {
                class_index,
                name_and_type_index,
            },
            RawEntry::InterfaceMethodRef(class_index, name_and_type_index) => PoolEntry::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            },
            RawEntry::NameAndType(name_index, descriptor_index) => PoolEntry::NameAndType {
                name_index,
                descriptor_index,
            },
            RawEntry::MethodHandle(reference_kind, reference_index) => PoolEntry::MethodHandle {
                reference_kind,
                reference_index,
            },
            RawEntry::MethodType(descriptor_index) => PoolEntry::MethodType { descriptor_index },
            RawEntry::Dynamic(bootstrap_index, name_and_type_index) => PoolEntry::Dynamic {
                bootstrap_index,
                name_and_type_index,
            },
            RawEntry::InvokeDynamic(bootstrap_index, name_and_type_index) => PoolEntry::InvokeDynamic {
                bootstrap_index,
                name_and_type_index,
            },
            RawEntry::Module(name_index) => PoolEntry::Module { name_index },
            RawEntry::Package(name_index) => PoolEntry::Package { name_index },
        }
    }
}

/// One entry of the `BootstrapMethods` class attribute.
#[binread]
#[derive(Clone, Debug, PartialEq, Eq)]
#[br(big)]
pub struct BootstrapMethod {
    /// Index of a `MethodHandle` entry.
    pub method_ref: u16,
    #[br(temp)]
    argument_count: u16,
    #[br(count = argument_count)]
    pub arguments: Vec<u16>,
}

#[binread]
#[br(big)]
struct BootstrapMethods {
    #[br(temp)]
    count: u16,
    #[br(count = count)]
    methods: Vec<BootstrapMethod>,
}

/// An in-memory constant pool plus the class's bootstrap methods.
#[derive(Clone, Debug, Default)]
pub struct ConstantTable {
    entries: Vec<PoolEntry>,
    bootstrap_methods: Vec<BootstrapMethod>,
}

impl ConstantTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `count - 1` entries, `count` being the classfile's
    /// `constant_pool_count`.
    pub fn read<R: Read + Seek>(reader: &mut R, count: u16) -> Result<Self> {
        let mut table = ConstantTable::new();
        while table.entries.len() + 1 < usize::from(count) {
            let entry = PoolEntry::from(RawEntry::read(reader)?);
            table.push(entry);
        }
        Ok(table)
    }

    /// Appends an entry and returns its index. Wide entries take two slots.
    pub fn push(&mut self, entry: PoolEntry) -> u16 {
        let wide = entry.is_wide();
        self.entries.push(entry);
        let index = self.entries.len() as u16;
        if wide {
            self.entries.push(PoolEntry::Unusable);
        }
        index
    }

    /// Appends a bootstrap method and returns its index in the attribute.
    pub fn push_bootstrap(&mut self, method_ref: u16, arguments: Vec<u16>) -> u16 {
        self.bootstrap_methods.push(BootstrapMethod { method_ref, arguments });
        (self.bootstrap_methods.len() - 1) as u16
    }

    /// Loads the body of a `BootstrapMethods` attribute.
    pub fn read_bootstrap_methods(&mut self, info: &[u8]) -> Result<()> {
        let parsed = BootstrapMethods::read(&mut std::io::Cursor::new(info))?;
        self.bootstrap_methods = parsed.methods;
        Ok(())
    }

    pub fn get(&self, index: u16) -> Option<&PoolEntry> {
        self.entries.get(usize::from(index).checked_sub(1)?)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index) {
            Some(PoolEntry::NameAndType {
                name_index,
                descriptor_index,
            }) => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            _ => Err(mismatch(index, "NameAndType")),
        }
    }

    /// Owner, name, descriptor and interface flag of a member reference.
    fn member(&self, index: u16) -> Result<(&str, &str, &str, bool)> {
        let (class_index, nat_index, is_interface) = match self.get(index) {
            Some(PoolEntry::FieldRef {
                class_index,
                name_and_type_index,
            })
            | Some(PoolEntry::MethodRef {
                class_index,
                name_and_type_index,
            }) => (*class_index, *name_and_type_index, false),
            Some(PoolEntry::InterfaceMethodRef {
                class_index,
                name_and_type_index,
            }) => (*class_index, *name_and_type_index, true),
            _ => return Err(mismatch(index, "member reference")),
        };
        let owner = self.class_name(class_index)?;
        let (name, descriptor) = self.name_and_type(nat_index)?;
        Ok((owner, name, descriptor, is_interface))
    }

    fn handle(&self, index: u16) -> Result<Handle> {
        let Some(PoolEntry::MethodHandle {
            reference_kind,
            reference_index,
        }) = self.get(index)
        else {
            return Err(mismatch(index, "MethodHandle"));
        };
        let (owner, name, descriptor, is_interface) = self.member(*reference_index)?;
        Ok(Handle {
            kind: *reference_kind,
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            is_interface,
        })
    }

    fn bootstrap(&self, index: u16) -> Result<(Handle, Vec<Constant>)> {
        let method = self
            .bootstrap_methods
            .get(usize::from(index))
            .ok_or_else(|| mismatch(index, "bootstrap method"))?;
        let handle = self.handle(method.method_ref)?;
        let arguments = method
            .arguments
            .iter()
            .map(|argument| self.constant(*argument))
            .collect::<Result<Vec<_>>>()?;
        Ok((handle, arguments))
    }
}

fn mismatch(index: u16, expected: &'static str) -> DecompileError {
    DecompileError::ConstantPool { index, expected }
}

impl ConstantPool for ConstantTable {
    fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index) {
            Some(PoolEntry::Utf8(value)) => Ok(value),
            _ => Err(mismatch(index, "Utf8")),
        }
    }

    fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index) {
            Some(PoolEntry::Class { name_index }) => self.utf8(*name_index),
            _ => Err(mismatch(index, "Class")),
        }
    }

    fn constant(&self, index: u16) -> Result<Constant> {
        let constant = match self.get(index) {
            Some(PoolEntry::Integer(value)) => Constant::Int(*value),
            Some(PoolEntry::Float(value)) => Constant::Float(*value),
            Some(PoolEntry::Long(value)) => Constant::Long(*value),
            Some(PoolEntry::Double(value)) => Constant::Double(*value),
            Some(PoolEntry::String { string_index }) => Constant::String(self.utf8(*string_index)?.to_string()),
            Some(PoolEntry::Class { name_index }) => Constant::Type(self.utf8(*name_index)?.to_string()),
            Some(PoolEntry::MethodType { descriptor_index }) => {
                Constant::MethodType(self.utf8(*descriptor_index)?.to_string())
            }
            Some(PoolEntry::MethodHandle { .. }) => Constant::Handle(self.handle(index)?),
            Some(PoolEntry::Dynamic {
                bootstrap_index,
                name_and_type_index,
            }) => {
                let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
                let (bootstrap, bootstrap_args) = self.bootstrap(*bootstrap_index)?;
                Constant::Dynamic(Box::new(ConstantDynamic {
                    name: name.to_string(),
                    descriptor: descriptor.to_string(),
                    bootstrap,
                    bootstrap_args,
                }))
            }
            _ => return Err(mismatch(index, "loadable constant")),
        };
        Ok(constant)
    }

    fn field_ref(&self, index: u16) -> Result<FieldRef> {
        if !matches!(self.get(index), Some(PoolEntry::FieldRef { .. })) {
            return Err(mismatch(index, "Fieldref"));
        }
        let (owner, name, descriptor, _) = self.member(index)?;
        Ok(FieldRef::new(owner, name, descriptor))
    }

    fn method_ref(&self, index: u16) -> Result<MethodRef> {
        if matches!(self.get(index), Some(PoolEntry::FieldRef { .. })) {
            return Err(mismatch(index, "Methodref"));
        }
        let (owner, name, descriptor, is_interface) = self.member(index)?;
        Ok(MethodRef {
            is_interface,
            ..MethodRef::new(owner, name, descriptor)
        })
    }

    fn call_site(&self, index: u16) -> Result<CallSite> {
        let Some(PoolEntry::InvokeDynamic {
            bootstrap_index,
            name_and_type_index,
        }) = self.get(index)
        else {
            return Err(mismatch(index, "InvokeDynamic"));
        };
        let (name, descriptor) = self.name_and_type(*name_and_type_index)?;
        let (bootstrap, bootstrap_args) = self.bootstrap(*bootstrap_index)?;
        Ok(CallSite {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            bootstrap,
            bootstrap_args,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_read_pool_with_wide_entry() {
        let bytes = [
            0x01, 0x00, 0x03, b'F', b'o', b'o', // #1 Utf8 "Foo"
            0x07, 0x00, 0x01, // #2 Class #1
            0x05, 0, 0, 0, 0, 0, 0, 0, 42, // #3 Long 42, #4 unusable
            0x08, 0x00, 0x01, // #5 String #1
        ];
        let table = ConstantTable::read(&mut Cursor::new(&bytes[..]), 6).unwrap();
        assert_eq!(table.len(), 5);
        assert_eq!(table.class_name(2).unwrap(), "Foo");
        assert_eq!(table.constant(3).unwrap(), Constant::Long(42));
        assert_eq!(table.get(4), Some(&PoolEntry::Unusable));
        assert_eq!(table.constant(5).unwrap(), Constant::String("Foo".into()));
        assert_eq!(table.constant(2).unwrap(), Constant::Type("Foo".into()));
        assert!(matches!(
            table.utf8(0),
            Err(DecompileError::ConstantPool { index: 0, .. })
        ));
        assert!(table.field_ref(2).is_err());
    }

    #[test]
    fn test_method_refs() {
        let mut table = ConstantTable::new();
        let owner_name = table.push(PoolEntry::Utf8("java/util/List".into()));
        let owner = table.push(PoolEntry::Class { name_index: owner_name });
        let name = table.push(PoolEntry::Utf8("size".into()));
        let descriptor = table.push(PoolEntry::Utf8("()I".into()));
        let nat = table.push(PoolEntry::NameAndType {
            name_index: name,
            descriptor_index: descriptor,
        });
        let method = table.push(PoolEntry::InterfaceMethodRef {
            class_index: owner,
            name_and_type_index: nat,
        });

        let resolved = table.method_ref(method).unwrap();
        assert!(resolved.is_interface);
        assert!(resolved.is("java/util/List", "size"));
        assert_eq!(resolved.descriptor, "()I");
        assert!(table.field_ref(method).is_err());
    }

    #[test]
    fn test_call_site_resolution() {
        let mut table = ConstantTable::new();
        let utf8 = |table: &mut ConstantTable, text: &str| table.push(PoolEntry::Utf8(text.into()));
        let factory_name = utf8(&mut table, "java/lang/invoke/LambdaMetafactory");
        let factory = table.push(PoolEntry::Class {
            name_index: factory_name,
        });
        let name = utf8(&mut table, "metafactory");
        let descriptor = utf8(&mut table, "(Ljava/lang/invoke/MethodHandles$Lookup;)Ljava/lang/invoke/CallSite;");
        let nat = table.push(PoolEntry::NameAndType {
            name_index: name,
            descriptor_index: descriptor,
        });
        let method = table.push(PoolEntry::MethodRef {
            class_index: factory,
            name_and_type_index: nat,
        });
        let handle = table.push(PoolEntry::MethodHandle {
            reference_kind: 6,
            reference_index: method,
        });
        let erased = utf8(&mut table, "()V");
        let erased_type = table.push(PoolEntry::MethodType {
            descriptor_index: erased,
        });
        let bootstrap = table.push_bootstrap(handle, vec![erased_type]);
        let site_name = utf8(&mut table, "run");
        let site_descriptor = utf8(&mut table, "()Ljava/lang/Runnable;");
        let site_nat = table.push(PoolEntry::NameAndType {
            name_index: site_name,
            descriptor_index: site_descriptor,
        });
        let site = table.push(PoolEntry::InvokeDynamic {
            bootstrap_index: bootstrap,
            name_and_type_index: site_nat,
        });

        let call_site = table.call_site(site).unwrap();
        assert_eq!(call_site.name, "run");
        assert_eq!(call_site.bootstrap.kind, 6);
        assert_eq!(call_site.bootstrap.owner, "java/lang/invoke/LambdaMetafactory");
        assert_eq!(call_site.bootstrap_args, vec![Constant::MethodType("()V".into())]);
    }

    #[test]
    fn test_bootstrap_attribute() {
        let mut table = ConstantTable::new();
        table
            .read_bootstrap_methods(&[0x00, 0x01, 0x00, 0x07, 0x00, 0x02, 0x00, 0x03, 0x00, 0x04])
            .unwrap();
        assert_eq!(table.push_bootstrap(1, vec![]), 1);
        assert!(table.call_site(1).is_err());
    }
}
