use pklwire_evaluator::EvaluatorManager;

use crate::cmd::{Context, VersionArgs};
use crate::exit::{evaluator_error, CliResult, SUCCESS};

pub fn run(args: VersionArgs, ctx: &Context) -> CliResult<i32> {
    if args.pkl {
        let manager = EvaluatorManager::with_command(ctx.pkl_command.clone());
        let version = manager
            .version()
            .map_err(|e| evaluator_error("failed to probe pkl version", e))?;
        println!("pkl {version}");
        return Ok(SUCCESS);
    }

    if !args.extended {
        println!("pklwire {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: pklwire");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("PKLWIRE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("pkl_command: {}", ctx.pkl_command);
    println!(
        "features: evaluator={}, serde={}, cli=true",
        cfg!(feature = "evaluator"),
        cfg!(feature = "serde")
    );

    Ok(SUCCESS)
}
