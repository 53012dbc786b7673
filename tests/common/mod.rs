#![allow(dead_code)]

use classfile_ir::generator::{Generator, GeneratorOptions};
use classfile_ir::optimizer::{Pipeline, PipelineOptions, PipelineStats};
use classfile_ir::visitor::{Frame, FrameItem};
use classfile_ir::{MethodAccessFlags, MethodHeader, StatementsMethod};

pub const OWNER: &str = "pkg/Test";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn static_method(descriptor: &str) -> Generator {
    init_logging();
    let header = MethodHeader::new(OWNER, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC, "run", descriptor)
        .unwrap();
    Generator::new(header, GeneratorOptions::default())
}

pub fn instance_method(descriptor: &str) -> Generator {
    init_logging();
    let header = MethodHeader::new(OWNER, MethodAccessFlags::PUBLIC, "run", descriptor).unwrap();
    Generator::new(header, GeneratorOptions::default())
}

pub fn checked() -> PipelineOptions {
    PipelineOptions {
        validate_each_rewrite: true,
        ..PipelineOptions::default()
    }
}

/// Finishes the generator and optimizes with consistency checks on.
pub fn optimize(generator: Generator) -> (StatementsMethod, PipelineStats) {
    let mut method = generator.finish().unwrap();
    method.check().unwrap();
    let stats = Pipeline::new(checked()).run(&mut method).unwrap();
    method.check().unwrap();
    (method, stats)
}

pub fn ints(count: usize) -> Frame {
    Frame {
        locals: vec![FrameItem::Integer; count],
        stack: vec![],
    }
}
