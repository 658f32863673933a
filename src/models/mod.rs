pub mod case_sheet;
pub mod enums;
pub mod global_record;
pub mod hospital;
pub mod lab;
pub mod patient;
pub mod prescription;
pub mod visit;
pub mod vital_sign;

pub use case_sheet::*;
pub use enums::*;
pub use global_record::*;
pub use hospital::*;
pub use lab::*;
pub use patient::*;
pub use prescription::*;
pub use visit::*;
pub use vital_sign::*;
