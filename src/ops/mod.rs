pub mod copy;
pub mod delete;
pub mod template_copy;

pub use copy::recursive_copy;
pub use delete::recursive_delete;
pub use template_copy::copy_template;
