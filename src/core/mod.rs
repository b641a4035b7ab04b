pub mod record;
pub mod toc;
pub mod unit;
