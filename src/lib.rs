pub mod core;
pub mod i18n;
pub mod logging;
pub mod plugins;
