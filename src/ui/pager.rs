use std::io::{self, IsTerminal, Write};
use std::process::{Command, Stdio};

/// Print `output`, piping it through `$WBACKUP_PAGER`/`$PAGER` when it does not fit the terminal.
pub fn print_with_pager(output: &str) -> io::Result<()> {
    if !io::stdout().is_terminal() {
        println!("{output}");
        return Ok(());
    }

    let (_, term_height) = crossterm::terminal::size().unwrap_or((80, 24));
    if output.lines().count() <= term_height as usize {
        println!("{output}");
        return Ok(());
    }

    let pager = ["WBACKUP_PAGER", "PAGER"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|s| !s.trim().is_empty()))
        .unwrap_or_else(|| "less -R".into());

    let mut parts = pager.split_whitespace();
    let program = parts.next().unwrap_or("less");
    let mut child = match Command::new(program)
        .args(parts)
        .stdin(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(_) => {
            println!("{output}");
            return Ok(());
        }
    };

    if let Some(mut stdin) = child.stdin.take() {
        // the pager may exit before reading everything
        let _ = writeln!(stdin, "{output}");
    }
    child.wait()?;
    Ok(())
}
