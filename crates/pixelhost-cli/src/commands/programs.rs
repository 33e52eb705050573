//! The `programs` command: edit the engine program table.

use std::path::PathBuf;

use anyhow::Result;
use pixelhost_runtime::pair::EngineProgram;

use crate::bootstrap::CliContext;
use crate::ProgramAction;

pub async fn execute(ctx: &CliContext, action: ProgramAction) -> Result<()> {
    let pair = ctx.controller.pair();
    match action {
        ProgramAction::List => {
            let programs = pair.list_programs().await?;
            if programs.is_empty() {
                println!("No engine programs configured.");
            }
            for program in programs {
                println!(
                    "{}  prefix={}  path={}",
                    program.name,
                    program.urlprefix,
                    program.path.display()
                );
            }
        }
        ProgramAction::Add {
            name,
            path,
            urlprefix,
        } => {
            add(ctx, name, path, urlprefix).await?;
        }
        ProgramAction::Remove { urlprefix } => {
            if pair.remove_program(&urlprefix).await? {
                println!("Removed program with prefix {urlprefix}.");
            } else {
                println!("No program with prefix {urlprefix}.");
            }
        }
    }
    Ok(())
}

async fn add(ctx: &CliContext, name: String, path: PathBuf, urlprefix: String) -> Result<()> {
    let pair = ctx.controller.pair();
    let display = name.clone();
    pair.add_program(EngineProgram::new(name, path, urlprefix))
        .await?;
    println!("Added program {display}.");
    Ok(())
}
