/// JVM type descriptors, stack categories and method metadata.
use crate::error::{DecompileError, Result};

/// Represents a JVM type from a descriptor string.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum JvmType {
    Int,
    Long,
    Float,
    Double,
    Byte,
    Char,
    Short,
    Boolean,
    Void,
    Reference(String),
    Array(Box<JvmType>),
}

/// The verifier's coarse view of a stack cell.
///
/// Booleans, bytes, chars and shorts all live on the stack as `Int`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StackCategory {
    Int,
    Long,
    Float,
    Double,
    Reference,
    ReturnAddress,
}

impl StackCategory {
    /// Long and double take two local slots.
    pub fn is_wide(self) -> bool {
        matches!(self, StackCategory::Long | StackCategory::Double)
    }

    pub fn slot_size(self) -> u16 {
        if self.is_wide() {
            2
        } else {
            1
        }
    }
}

impl JvmType {
    /// Returns true if this type occupies two slots on the JVM stack.
    pub fn is_wide(&self) -> bool {
        matches!(self, JvmType::Long | JvmType::Double)
    }

    /// The stack category of a value of this type, `None` for `void`.
    pub fn category(&self) -> Option<StackCategory> {
        match self {
            JvmType::Int | JvmType::Byte | JvmType::Char | JvmType::Short | JvmType::Boolean => {
                Some(StackCategory::Int)
            }
            JvmType::Long => Some(StackCategory::Long),
            JvmType::Float => Some(StackCategory::Float),
            JvmType::Double => Some(StackCategory::Double),
            JvmType::Reference(_) | JvmType::Array(_) => Some(StackCategory::Reference),
            JvmType::Void => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, JvmType::Reference(_) | JvmType::Array(_))
    }

    /// Returns the JVM descriptor string for this type.
    pub fn to_descriptor(&self) -> String {
        match self {
            JvmType::Int => "I".into(),
            JvmType::Long => "J".into(),
            JvmType::Float => "F".into(),
            JvmType::Double => "D".into(),
            JvmType::Byte => "B".into(),
            JvmType::Char => "C".into(),
            JvmType::Short => "S".into(),
            JvmType::Boolean => "Z".into(),
            JvmType::Void => "V".into(),
            JvmType::Reference(name) => format!("L{};", name),
            JvmType::Array(inner) => format!("[{}", inner.to_descriptor()),
        }
    }

    /// Returns the source-level name, e.g. `java.lang.String[]`.
    pub fn source_name(&self) -> String {
        match self {
            JvmType::Int => "int".into(),
            JvmType::Long => "long".into(),
            JvmType::Float => "float".into(),
            JvmType::Double => "double".into(),
            JvmType::Byte => "byte".into(),
            JvmType::Char => "char".into(),
            JvmType::Short => "short".into(),
            JvmType::Boolean => "boolean".into(),
            JvmType::Void => "void".into(),
            JvmType::Reference(name) => internal_to_source_name(name),
            JvmType::Array(inner) => format!("{}[]", inner.source_name()),
        }
    }

    /// The type named by a `checkcast`/`anewarray` operand: either an
    /// internal class name or an array descriptor.
    pub fn from_internal_name(name: &str) -> Result<JvmType> {
        if name.starts_with('[') {
            parse_type_descriptor(name)
        } else {
            Ok(JvmType::Reference(name.to_string()))
        }
    }
}

impl std::fmt::Display for JvmType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source_name())
    }
}

/// Parse a single type descriptor starting at position `pos` in `desc`.
/// Returns (JvmType, next_position).
pub fn parse_type_at(desc: &str, pos: usize) -> Option<(JvmType, usize)> {
    let bytes = desc.as_bytes();
    if pos >= bytes.len() {
        return None;
    }
    match bytes[pos] {
        b'B' => Some((JvmType::Byte, pos + 1)),
        b'C' => Some((JvmType::Char, pos + 1)),
        b'D' => Some((JvmType::Double, pos + 1)),
        b'F' => Some((JvmType::Float, pos + 1)),
        b'I' => Some((JvmType::Int, pos + 1)),
        b'J' => Some((JvmType::Long, pos + 1)),
        b'S' => Some((JvmType::Short, pos + 1)),
        b'Z' => Some((JvmType::Boolean, pos + 1)),
        b'V' => Some((JvmType::Void, pos + 1)),
        b'L' => {
            let semi = desc[pos + 1..].find(';')?;
            let class_name = &desc[pos + 1..pos + 1 + semi];
            Some((JvmType::Reference(class_name.to_string()), pos + 1 + semi + 1))
        }
        b'[' => {
            let (inner, next) = parse_type_at(desc, pos + 1)?;
            Some((JvmType::Array(Box::new(inner)), next))
        }
        _ => None,
    }
}

/// Parse a full field type descriptor string.
pub fn parse_type_descriptor(desc: &str) -> Result<JvmType> {
    match parse_type_at(desc, 0) {
        Some((ty, end)) if end == desc.len() => Ok(ty),
        _ => Err(DecompileError::Descriptor(desc.to_string())),
    }
}

/// A parsed method descriptor, e.g. `(ILjava/lang/String;)V`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: Vec<JvmType>,
    pub ret: JvmType,
}

impl MethodDescriptor {
    pub fn parse(desc: &str) -> Result<Self> {
        let malformed = || DecompileError::Descriptor(desc.to_string());
        if !desc.starts_with('(') {
            return Err(malformed());
        }
        let close = desc.find(')').ok_or_else(malformed)?;
        let mut params = Vec::new();
        let mut pos = 1;
        while pos < close {
            let (ty, next) = parse_type_at(desc, pos).ok_or_else(malformed)?;
            if ty == JvmType::Void {
                return Err(malformed());
            }
            params.push(ty);
            pos = next;
        }
        match parse_type_at(desc, close + 1) {
            Some((ret, end)) if end == desc.len() => Ok(MethodDescriptor { params, ret }),
            _ => Err(malformed()),
        }
    }

    /// Number of local slots taken by the parameters (not counting `this`).
    pub fn param_slots(&self) -> u16 {
        self.params
            .iter()
            .map(|p| if p.is_wide() { 2 } else { 1 })
            .sum()
    }
}

impl std::fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(")?;
        for param in &self.params {
            write!(f, "{}", param.to_descriptor())?;
        }
        write!(f, "){}", self.ret.to_descriptor())
    }
}

/// Convert internal class name to source name.
pub fn internal_to_source_name(name: &str) -> String {
    name.replace('/', ".")
}

/// Get just the simple class name from an internal name.
pub fn simple_class_name(name: &str) -> &str {
    match name.rfind('/') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Convert a `newarray` type code to its element type.
pub fn newarray_type(atype: u8) -> Option<JvmType> {
    match atype {
        4 => Some(JvmType::Boolean),
        5 => Some(JvmType::Char),
        6 => Some(JvmType::Float),
        7 => Some(JvmType::Double),
        8 => Some(JvmType::Byte),
        9 => Some(JvmType::Short),
        10 => Some(JvmType::Int),
        11 => Some(JvmType::Long),
        _ => None,
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct MethodAccessFlags(u16);

bitflags! {
    impl MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;       //	Declared public; may be accessed from outside its package.
        const PRIVATE = 0x0002;      //	Declared private; accessible only within the defining class.
        const PROTECTED = 0x0004;    //	Declared protected; may be accessed within subclasses.
        const STATIC = 0x0008;       //	Declared static.
        const FINAL = 0x0010;        //	Declared final; must not be overridden.
        const SYNCHRONIZED = 0x0020; //	Declared synchronized; invocation is wrapped by a monitor use.
        const BRIDGE = 0x0040;       //	A bridge method, generated by the compiler.
        const VARARGS = 0x0080;      //	Declared with variable number of arguments.
        const NATIVE = 0x0100;       //	Declared native; implemented in a language other than Java.
        const ABSTRACT = 0x0400;     //	Declared abstract; no implementation is provided.
        const STRICT = 0x0800;       //	Declared strictfp; floating-point mode is FP-strict.
        const SYNTHETIC = 0x1000;    //	Declared synthetic; not present in the source code.
    }
}

/// The core signature of the method being decompiled.
#[derive(Clone, Debug)]
pub struct MethodHeader {
    /// Internal name of the declaring class, e.g. `java/lang/Object`.
    pub owner: String,
    pub access: MethodAccessFlags,
    pub name: String,
    pub descriptor: MethodDescriptor,
}

impl MethodHeader {
    pub fn new(owner: &str, access: MethodAccessFlags, name: &str, descriptor: &str) -> Result<Self> {
        Ok(MethodHeader {
            owner: owner.to_string(),
            access,
            name: name.to_string(),
            descriptor: MethodDescriptor::parse(descriptor)?,
        })
    }

    pub fn is_static(&self) -> bool {
        self.access.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    /// The types of the method's entry locals, `this` first for instance methods.
    pub fn entry_locals(&self) -> Vec<JvmType> {
        let mut locals = Vec::with_capacity(self.descriptor.params.len() + 1);
        if !self.is_static() {
            locals.push(JvmType::Reference(self.owner.clone()));
        }
        locals.extend(self.descriptor.params.iter().cloned());
        locals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_primitives() {
        assert_eq!(parse_type_descriptor("I").unwrap(), JvmType::Int);
        assert_eq!(parse_type_descriptor("J").unwrap(), JvmType::Long);
        assert_eq!(parse_type_descriptor("D").unwrap(), JvmType::Double);
        assert_eq!(parse_type_descriptor("Z").unwrap(), JvmType::Boolean);
        assert!(parse_type_descriptor("II").is_err());
        assert!(parse_type_descriptor("X").is_err());
    }

    #[test]
    fn test_parse_array() {
        assert_eq!(
            parse_type_descriptor("[[Ljava/lang/Object;").unwrap(),
            JvmType::Array(Box::new(JvmType::Array(Box::new(JvmType::Reference(
                "java/lang/Object".into()
            )))))
        );
        assert_eq!(
            JvmType::from_internal_name("[I").unwrap(),
            JvmType::Array(Box::new(JvmType::Int))
        );
        assert_eq!(
            JvmType::from_internal_name("java/util/List").unwrap().source_name(),
            "java.util.List"
        );
    }

    #[test]
    fn test_parse_method_descriptor() {
        let desc = MethodDescriptor::parse("(Ljava/lang/String;JI)[B").unwrap();
        assert_eq!(
            desc.params,
            vec![JvmType::Reference("java/lang/String".into()), JvmType::Long, JvmType::Int]
        );
        assert_eq!(desc.ret, JvmType::Array(Box::new(JvmType::Byte)));
        assert_eq!(desc.param_slots(), 4);

        assert!(MethodDescriptor::parse("(V)V").is_err());
        assert!(MethodDescriptor::parse("(I").is_err());
        assert!(MethodDescriptor::parse("()VV").is_err());
    }

    #[test]
    fn test_categories() {
        assert_eq!(JvmType::Boolean.category(), Some(StackCategory::Int));
        assert_eq!(JvmType::Void.category(), None);
        assert!(StackCategory::Double.is_wide());
        assert_eq!(StackCategory::Reference.slot_size(), 1);
    }

    #[test]
    fn test_entry_locals() {
        let header = MethodHeader::new("a/B", MethodAccessFlags::PUBLIC, "m", "(IJ)V").unwrap();
        assert_eq!(header.entry_locals().len(), 3);
        let header = MethodHeader::new(
            "a/B",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            "m",
            "(IJ)V",
        )
        .unwrap();
        assert_eq!(header.entry_locals(), vec![JvmType::Int, JvmType::Long]);
        assert_eq!(simple_class_name("a/B"), "B");
        assert_eq!(newarray_type(10), Some(JvmType::Int));
        assert_eq!(newarray_type(3), None);
    }
}
