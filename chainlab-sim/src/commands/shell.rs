//! Shell built-ins over the VFS.
//!
//! Short options (`-r`, `-p`, `-a`) reach these handlers as positionals,
//! since the tokenizer only recognises `--long` flags.

use crate::effects::{CommandResult, SideEffect};
use crate::path;
use crate::tokenizer::Invocation;
use crate::vfs::VfsNode;

use super::HandlerContext;

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Split positionals into short options and operands.
fn options(inv: &Invocation) -> (String, Vec<&str>) {
    let mut letters = String::new();
    let mut operands = Vec::new();
    for arg in &inv.positionals {
        match arg.strip_prefix('-') {
            Some(opts) if !opts.is_empty() && !opts.starts_with('-') => letters.push_str(opts),
            _ => operands.push(arg.as_str()),
        }
    }
    (letters, operands)
}

pub fn ls(inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    let (opts, operands) = options(inv);
    let show_hidden = opts.contains('a') || inv.has_flag("all");
    let targets = if operands.is_empty() { vec!["."] } else { operands };

    let mut out = String::new();
    let mut err = String::new();
    let many = targets.len() > 1;

    for input in targets {
        let target = ctx.resolve(input);
        match ctx.vfs.node(&target) {
            None => err.push_str(&format!(
                "ls: cannot access '{}': No such file or directory\n",
                input
            )),
            Some(VfsNode::File { name, .. }) => {
                out.push_str(name);
                out.push('\n');
            }
            Some(VfsNode::Directory { children, .. }) => {
                if many {
                    out.push_str(&format!("{}:\n", input));
                }
                let names: Vec<String> = children
                    .iter()
                    .filter(|(name, _)| show_hidden || !name.starts_with('.'))
                    .map(|(name, node)| {
                        if node.is_dir() {
                            format!("{}/", name)
                        } else {
                            name.clone()
                        }
                    })
                    .collect();
                if !names.is_empty() {
                    out.push_str(&names.join("  "));
                    out.push('\n');
                }
            }
        }
    }

    CommandResult {
        exit_code: if err.is_empty() { 0 } else { 1 },
        stdout: out,
        stderr: err,
        side_effects: Vec::new(),
    }
}

pub fn cd(inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    let (_, operands) = options(inv);
    let input = match operands.as_slice() {
        [] => "~",
        [one] => *one,
        _ => return CommandResult::fail("cd: too many arguments\n"),
    };

    let target = ctx.resolve(input);
    match ctx.vfs.node(&target) {
        Some(node) if node.is_dir() => {
            CommandResult::ok_with("", vec![SideEffect::ChangeDir { path: target }])
        }
        Some(_) => CommandResult::fail(format!("cd: not a directory: {}\n", input)),
        None => CommandResult::fail(format!("cd: no such file or directory: {}\n", input)),
    }
}

pub fn pwd(_inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    CommandResult::ok(format!("{}\n", path::display(ctx.cwd)))
}

pub fn cat(inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    let (_, operands) = options(inv);
    if operands.is_empty() {
        return CommandResult::fail("cat: missing file operand\n");
    }

    let mut out = String::new();
    for input in operands {
        let target = ctx.resolve(input);
        match ctx.vfs.node(&target) {
            Some(VfsNode::File { content, .. }) => out.push_str(content),
            Some(VfsNode::Directory { .. }) => {
                return CommandResult::fail(format!("cat: {}: Is a directory\n", input))
            }
            None => {
                return CommandResult::fail(format!("cat: {}: No such file or directory\n", input))
            }
        }
    }
    CommandResult::ok(out)
}

pub fn mkdir(inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    let (opts, operands) = options(inv);
    let parents = opts.contains('p') || inv.has_flag("parents");
    if operands.is_empty() {
        return CommandResult::fail("mkdir: missing operand\n");
    }

    let mut effects = Vec::new();
    for input in operands {
        let target = ctx.resolve(input);
        if target.is_empty() || ctx.vfs.exists(&target) {
            if parents && ctx.vfs.is_dir(&target) {
                continue;
            }
            return CommandResult::fail(format!(
                "mkdir: cannot create directory '{}': File exists\n",
                input
            ));
        }
        if !parents && !parent_is_dir(ctx, &target) {
            return CommandResult::fail(format!(
                "mkdir: cannot create directory '{}': No such file or directory\n",
                input
            ));
        }
        effects.push(SideEffect::CreateDir { path: target });
    }
    CommandResult::ok_with("", effects)
}

pub fn touch(inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    let (_, operands) = options(inv);
    if operands.is_empty() {
        return CommandResult::fail("touch: missing file operand\n");
    }

    let mut effects = Vec::new();
    for input in operands {
        let target = ctx.resolve(input);
        if ctx.vfs.exists(&target) {
            continue;
        }
        if target.is_empty() || !parent_is_dir(ctx, &target) {
            return CommandResult::fail(format!(
                "touch: cannot touch '{}': No such file or directory\n",
                input
            ));
        }
        effects.push(SideEffect::CreateFile {
            path: target,
            content: String::new(),
        });
    }
    CommandResult::ok_with("", effects)
}

pub fn rm(inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    let (opts, operands) = options(inv);
    let recursive = opts.contains('r') || opts.contains('R') || inv.has_flag("recursive");
    let force = opts.contains('f') || inv.has_flag("force");
    if operands.is_empty() {
        return if force {
            CommandResult::ok("")
        } else {
            CommandResult::fail("rm: missing operand\n")
        };
    }

    let mut effects = Vec::new();
    for input in operands {
        let target = ctx.resolve(input);
        if target.is_empty() {
            return CommandResult::fail(format!("rm: refusing to remove '{}'\n", input));
        }
        match ctx.vfs.node(&target) {
            None if force => {}
            None => {
                return CommandResult::fail(format!(
                    "rm: cannot remove '{}': No such file or directory\n",
                    input
                ))
            }
            Some(node) if node.is_dir() && !recursive => {
                return CommandResult::fail(format!("rm: cannot remove '{}': Is a directory\n", input))
            }
            Some(_) => effects.push(SideEffect::DeletePath { path: target }),
        }
    }
    CommandResult::ok_with("", effects)
}

/// `echo words… [> file | >> file]`, with `$NAME` expanded from the
/// environment.
pub fn echo(inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    let args = inv.args();
    let redirect = (0..args.len()).find(|&i| inv.is_operator(i, ">") || inv.is_operator(i, ">>"));

    let (words, sink) = match redirect {
        Some(index) => match args.get(index + 1) {
            Some(file) if index + 2 == args.len() => (&args[..index], Some((args[index] == ">>", file))),
            _ => return CommandResult::fail("echo: syntax error near redirection\n"),
        },
        None => (args, None),
    };

    let text = words
        .iter()
        .map(|word| expand(word, ctx))
        .collect::<Vec<_>>()
        .join(" ");
    let line = format!("{}\n", text);

    let Some((append, file)) = sink else {
        return CommandResult::ok(line);
    };

    let target = ctx.resolve(file);
    if target.is_empty() || ctx.vfs.is_dir(&target) {
        return CommandResult::fail(format!("echo: {}: Is a directory\n", file));
    }
    if !parent_is_dir(ctx, &target) {
        return CommandResult::fail(format!("echo: {}: No such file or directory\n", file));
    }

    let content = match ctx.vfs.get_file(&target) {
        Some(existing) if append => format!("{}{}", existing, line),
        _ => line,
    };
    CommandResult::ok_with("", vec![SideEffect::CreateFile { path: target, content }])
}

fn expand(word: &str, ctx: &HandlerContext<'_>) -> String {
    match word.strip_prefix('$') {
        Some(name) if !name.is_empty() => ctx.env.get(name).cloned().unwrap_or_default(),
        _ => word.to_string(),
    }
}

pub fn export(inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    let args = inv.args();
    if args.is_empty() {
        let listing: String = ctx
            .env
            .iter()
            .map(|(k, v)| format!("declare -x {}=\"{}\"\n", k, v))
            .collect();
        return CommandResult::ok(listing);
    }

    let mut effects = Vec::new();
    for arg in args {
        let Some((key, value)) = arg.split_once('=') else {
            continue;
        };
        let valid = key
            .chars()
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false)
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return CommandResult::fail(format!("export: `{}': not a valid identifier\n", arg));
        }
        effects.push(SideEffect::SetEnv {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    CommandResult::ok_with("", effects)
}

pub fn env(_inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    CommandResult::ok(
        ctx.env
            .iter()
            .map(|(k, v)| format!("{}={}\n", k, v))
            .collect::<String>(),
    )
}

pub fn history(_inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    CommandResult::ok(
        ctx.history
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{:>5}  {}\n", i + 1, line))
            .collect::<String>(),
    )
}

pub fn clear(_inv: &Invocation, _ctx: &mut HandlerContext<'_>) -> CommandResult {
    CommandResult::ok(CLEAR_SCREEN)
}

pub fn help(_inv: &Invocation, ctx: &mut HandlerContext<'_>) -> CommandResult {
    let width = ctx.catalog.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    let mut out = String::from("Available commands:\n\n");
    for (name, summary) in ctx.catalog {
        out.push_str(&format!("  {:<width$}  {}\n", name, summary, width = width));
    }
    out.push_str("\nPrefixes `solana`, `solana-keygen` and `spl-token` are accepted.\n");
    CommandResult::ok(out)
}

fn parent_is_dir(ctx: &HandlerContext<'_>, target: &str) -> bool {
    match path::split_parent(target) {
        Some((parent, _)) => ctx.vfs.is_dir(&parent),
        None => false,
    }
}
