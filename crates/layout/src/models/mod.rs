mod chapter;
mod ids;
mod page;
mod page_count;
mod settings;

pub use self::chapter::{BookInfo, Chapter, into_reading_order};
pub use self::ids::{BookId, ChapterId};
pub use self::page::{ChapterPosition, PageData, PagePosition};
pub use self::page_count::PageCountCacheData;
pub use self::settings::{ContainerSize, FlipEffect, Layout, LayoutKey, ReaderSettings};
