use prospect_core::{evidence, CriterionCode, JsonLinesSource, ProfileSource};

use super::super::args::InspectArgs;
use crate::exit_codes;

pub(crate) fn run(args: InspectArgs) -> anyhow::Result<i32> {
    let profiles = match JsonLinesSource::new(&args.input).profiles() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("input error: {e}");
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    for profile in &profiles {
        let (fingerprint, ev) = evidence::extract(profile);
        let counts: Vec<String> = CriterionCode::ALL
            .iter()
            .map(|c| format!("{}={}", c, ev.count(*c)))
            .collect();
        println!(
            "{}\t{}\t{}",
            profile.id,
            fingerprint.short(),
            counts.join(" ")
        );
        if args.spans {
            for (code, spans) in ev.iter() {
                for span in spans {
                    println!("  {code}: {span}");
                }
            }
        }
    }
    eprintln!("{} profile(s) inspected", profiles.len());
    Ok(exit_codes::SUCCESS)
}
