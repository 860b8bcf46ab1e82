use clap::{Arg, Command};
use std::io::{self, Write};

fn main() -> anyhow::Result<()> {
    let matches = Command::new("gen")
        .arg(
            Arg::new("rows")
                .long("rows")
                .value_parser(clap::value_parser!(u64))
                .required(true),
        )
        .arg(
            Arg::new("with_header")
                .long("with-header")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(Arg::new("delim").long("delim").default_value(","))
        .arg(
            Arg::new("crlf")
                .long("crlf")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let rows = *matches
        .get_one::<u64>("rows")
        .ok_or_else(|| anyhow::anyhow!("--rows is required"))?;
    let with_header = matches.get_flag("with_header");
    let delim = matches
        .get_one::<String>("delim")
        .map(String::as_str)
        .unwrap_or(",");
    let eol = if matches.get_flag("crlf") { "\r\n" } else { "\n" };

    let mut out = io::BufWriter::new(io::stdout().lock());

    if with_header {
        write!(&mut out, "id{d}name{d}score{d}ratio{d}notes{eol}", d = delim)?;
    }

    // Deterministic data covering the coercion cases: integer, decimal,
    // text, and a blank cell every seventh row.
    for i in 0..rows {
        let notes = if i % 7 == 0 { String::new() } else { format!("note {i}") };
        write!(
            &mut out,
            "{i:06}{d}name_{i}{d}{}{d}{:.3}{d}{notes}{eol}",
            i % 100,
            i as f64 / 7.0,
            d = delim
        )?;
        if i % 10_000 == 0 {
            out.flush()?;
        } // keep buffers moving on huge runs
    }

    out.flush()?;
    Ok(())
}
