use anyhow::Result;
use log::Log;

use dbt_cli::commands::{build_cli, dispatch, Function};

fn main() -> Result<()> {
    if let Err(e) = dbt_classifiers::run_log::init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let matches = build_cli().get_matches();
    // Both are required arguments, so clap has already rejected their absence.
    let set_type = matches.get_one::<String>("set_type").cloned().unwrap_or_default();
    let fn_name = matches.get_one::<String>("fn_name").cloned().unwrap_or_default();

    let Some(function) = Function::parse(&fn_name) else {
        println!("Function {} is not recognized.", fn_name);
        std::process::exit(1);
    };

    if let Err(e) = dispatch(&function, &set_type, &matches) {
        log::error!("{:#}", e);
        log::logger().flush();
        std::process::exit(1);
    }
    Ok(())
}
