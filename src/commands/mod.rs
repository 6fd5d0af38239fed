pub mod backups;
pub mod browse;
pub mod categories;
pub mod common;
pub mod records;
pub mod system;
pub mod transfer;

pub use backups::{handle_backup_create, handle_backup_list, handle_backup_restore};
pub use browse::{handle_find, handle_history, handle_ls};
pub use categories::{handle_category_add, handle_category_ls, handle_category_rename};
pub use records::{
    handle_delete, handle_dup, handle_edit, handle_fav, handle_mv, handle_new, handle_show,
};
pub use system::{handle_reset, handle_stats, handle_theme};
pub use transfer::{handle_export, handle_import};
