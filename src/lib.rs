//! Rebuilds structured statement trees from JVM method bodies.
//!
//! A method arrives as [`visitor::MethodVisitor`] callbacks, either from a
//! caller's own class reader or from the raw `Code` attribute decoder in
//! [`bytecode`]. The [`generator::Generator`] turns them into flat IR over an
//! arena ([`ir::Ir`]), and the [`optimizer::Pipeline`] rewrites that IR to a
//! fixed point, recovering expressions, increments, string concatenation and
//! structured control flow.
//!
//! ```rust
//! use classfile_ir::generator::{Generator, GeneratorOptions};
//! use classfile_ir::optimizer::Pipeline;
//! use classfile_ir::types::{MethodAccessFlags, MethodHeader};
//! use classfile_ir::visitor::{opcodes::*, MethodVisitor};
//!
//! # fn main() -> classfile_ir::error::Result<()> {
//! let header = MethodHeader::new("pkg/Math", MethodAccessFlags::STATIC, "add", "(II)I")?;
//! let mut generator = Generator::new(header, GeneratorOptions::default());
//! generator.visit_var_insn(ILOAD, 0)?;
//! generator.visit_var_insn(ILOAD, 1)?;
//! generator.visit_insn(IADD)?;
//! generator.visit_insn(IRETURN)?;
//!
//! let mut method = generator.finish()?;
//! Pipeline::default().run(&mut method)?;
//! assert_eq!(method.dump(), "return l0 + l1;\n");
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate bitflags;

pub mod error;
pub mod generator;
pub mod ir;
pub mod optimizer;
pub mod types;
pub mod visitor;

#[cfg(feature = "bytecode")]
pub mod bytecode;

pub use error::{DecompileError, Result};
pub use ir::StatementsMethod;
pub use types::{MethodAccessFlags, MethodHeader};

#[cfg(feature = "bytecode")]
use bytecode::{CodeBody, ConstantPool};
#[cfg(feature = "bytecode")]
use generator::{Generator, GeneratorOptions};
#[cfg(feature = "bytecode")]
use optimizer::{Pipeline, PipelineOptions};

/// Decodes the body of a `Code` attribute and runs it through the
/// generator and a pipeline built from `options`.
///
/// ```rust
/// use classfile_ir::bytecode::ConstantTable;
/// use classfile_ir::optimizer::PipelineOptions;
/// use classfile_ir::{decompile_code, MethodAccessFlags, MethodHeader};
///
/// // max_stack, max_locals, code_length, iload_0, ineg, ireturn, no tables
/// let code = [0, 1, 0, 1, 0, 0, 0, 3, 0x1a, 0x74, 0xac, 0, 0, 0, 0];
/// let header = MethodHeader::new("pkg/Math", MethodAccessFlags::STATIC, "neg", "(I)I").unwrap();
/// let method = decompile_code(header, &code, &ConstantTable::new(), &PipelineOptions::default()).unwrap();
/// assert_eq!(method.dump(), "return -l0;\n");
/// ```
#[cfg(feature = "bytecode")]
pub fn decompile_code(
    header: MethodHeader,
    code: &[u8],
    pool: &dyn ConstantPool,
    options: &PipelineOptions,
) -> Result<StatementsMethod> {
    let body = CodeBody::parse(code, pool)?;
    let mut generator = Generator::new(header.clone(), GeneratorOptions::default());
    body.accept(&header, pool, &mut generator)?;
    let mut method = generator.finish()?;
    Pipeline::new(options.clone()).run(&mut method)?;
    Ok(method)
}
