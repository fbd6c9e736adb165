use std::io::Read;

use pklwire_evaluator::{Evaluator, EvaluatorManager, EvaluatorOptions, ModuleSource};
use url::Url;

use crate::cmd::{Context, EvalArgs};
use crate::exit::{evaluator_error, io_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{self, OutputFormat};

pub fn run(args: EvalArgs, ctx: &Context) -> CliResult<i32> {
    let source = module_source(&args.module)?;
    let options = options(&args)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_error("failed to start async runtime", e))?;
    runtime.block_on(evaluate(args, ctx, source, options))
}

async fn evaluate(
    args: EvalArgs,
    ctx: &Context,
    source: ModuleSource,
    options: EvaluatorOptions,
) -> CliResult<i32> {
    let manager = EvaluatorManager::with_command(ctx.pkl_command.clone());
    let created = match &args.project_dir {
        Some(dir) => manager.new_project_evaluator(dir, options).await,
        None => manager.new_evaluator(options).await,
    };
    let evaluator = match created {
        Ok(evaluator) => evaluator,
        Err(e) => {
            manager.close();
            return Err(evaluator_error("failed to create evaluator", e));
        }
    };
    tracing::debug!(evaluator_id = evaluator.id(), module = source.module_uri(), "evaluating module");

    let result = render(&evaluator, &source, &args, ctx.format).await;
    evaluator.close().await;
    manager.close();
    result.map(|()| SUCCESS)
}

async fn render(
    evaluator: &Evaluator,
    source: &ModuleSource,
    args: &EvalArgs,
    format: OutputFormat,
) -> CliResult<()> {
    let failed = |e| evaluator_error("evaluation failed", e);
    if args.text {
        let text = evaluator.evaluate_output_text(source).await.map_err(failed)?;
        output::print_text(&text);
        return Ok(());
    }
    if args.files {
        let files = evaluator.evaluate_output_files(source).await.map_err(failed)?;
        return output::print_files(&files, format);
    }

    let expr = args.expr.as_deref().unwrap_or("");
    if format == OutputFormat::Raw {
        let bytes = evaluator
            .evaluate_expression_raw(source, expr)
            .await
            .map_err(failed)?;
        output::print_raw(&bytes);
        return Ok(());
    }
    let value = evaluator
        .evaluate_expression(source, expr)
        .await
        .map_err(failed)?;
    output::print_value(&value, format)
}

/// Inline properties on top of preconfigured options. Within a project the
/// project's own settings stand in for the preconfigured ones.
fn options(args: &EvalArgs) -> CliResult<EvaluatorOptions> {
    let mut options = if args.project_dir.is_some() {
        EvaluatorOptions::default()
    } else {
        EvaluatorOptions::preconfigured()
    };
    for property in &args.properties {
        let (name, value) = property.split_once('=').ok_or_else(|| {
            CliError::new(
                USAGE,
                format!("invalid property {property:?}: expected NAME=VALUE"),
            )
        })?;
        options = options.with_property(name, value);
    }
    if let Some(format) = args.output_format {
        options = options.with_output_format(format);
    }
    Ok(options)
}

fn module_source(module: &str) -> CliResult<ModuleSource> {
    if module == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(|e| io_error("failed to read module from stdin", e))?;
        return Ok(ModuleSource::text(text));
    }

    // Single-letter schemes are Windows drive letters.
    let is_uri = Url::parse(module).is_ok_and(|url| url.scheme().len() > 1);
    let source = if is_uri {
        ModuleSource::uri(module)
    } else {
        ModuleSource::file(module)
    };
    source.map_err(|e| evaluator_error("invalid module", e))
}
