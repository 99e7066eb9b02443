//! Interactive milestone recording

use anyhow::{Context, Result};
use std::io::{BufRead, Write};

use fitsync::{ActivityStore, Milestone, MilestoneStore};

/// Ask for a milestone on `input` and record it
///
/// Lists the known activity types, then reads the type, title and
/// description one line each.
pub fn prompt<S, R, W>(store: &S, input: &mut R, output: &mut W) -> Result<Milestone>
where
    S: ActivityStore + MilestoneStore,
    R: BufRead,
    W: Write,
{
    writeln!(output, "== record milestone ==")?;
    writeln!(output, "\nWhich activity?")?;
    for activity_type in fitsync::activity_types(store)? {
        writeln!(output, "- {}", activity_type)?;
    }
    let activity_type = read_answer(input, output)?;

    writeln!(output, "\nTitle?")?;
    let name = read_answer(input, output)?;

    writeln!(output, "\nDescribe what you did!")?;
    let description = read_answer(input, output)?;

    let milestone = fitsync::record_milestone(store, &name, &activity_type, &description)?;
    writeln!(
        output,
        "Recorded '{}' ({}) on {}",
        milestone.name,
        milestone.activity_type,
        milestone.started_on.format("%b %-d, %Y")
    )?;
    Ok(milestone)
}

fn read_answer<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<String> {
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line).context("Failed to read answer")?;
    Ok(line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fitsync::{Activity, InMemoryStore, RemoteId};
    use std::io::Cursor;

    #[test]
    fn test_prompt_records_milestone() {
        let store = InMemoryStore::new();
        store
            .upsert_activity(&Activity {
                remote_id: RemoteId::new(1),
                external_id: None,
                name: "Lunch Run".to_string(),
                activity_type: "Run".to_string(),
                started_on: Utc::now(),
                data: "{}".to_string(),
            })
            .unwrap();

        let mut input = Cursor::new("Run\nFirst half marathon\nFelt great\n");
        let mut output = Vec::new();
        let milestone = prompt(&store, &mut input, &mut output).unwrap();

        assert_eq!(milestone.activity_type, "Run");
        assert_eq!(milestone.name, "First half marathon");
        assert_eq!(milestone.description, "Felt great");
        assert_eq!(store.list_milestones().unwrap().len(), 1);

        let shown = String::from_utf8(output).unwrap();
        assert!(shown.contains("Which activity?\n- Run\n"));
        assert!(shown.contains("Recorded 'First half marathon'"));
    }

    #[test]
    fn test_prompt_without_title_records_nothing() {
        let store = InMemoryStore::new();
        let mut input = Cursor::new("Ride\n\n\n");
        let mut output = Vec::new();

        assert!(prompt(&store, &mut input, &mut output).is_err());
        assert!(store.list_milestones().unwrap().is_empty());
    }
}
