pub mod bitflags;
pub mod dual;
pub mod errorfmt;
pub mod mmap;
pub mod oserror;
