//! Dispatcher behind the `dbt` binary: `dbt <set_type> <fn_name>`.
pub mod commands;
pub mod stages;
