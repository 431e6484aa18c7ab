//! Per-call activation record for the VM (spec §4.7).

use std::rc::Rc;

use crate::object::Closure;

pub struct Frame {
    pub closure: Rc<Closure>,
    pub ip: isize,
    pub base_pointer: usize,
}

impl Frame {
    pub fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Frame {
            closure,
            ip: -1,
            base_pointer,
        }
    }

    pub fn instructions(&self) -> &[u8] {
        &self.closure.function.instructions
    }
}
