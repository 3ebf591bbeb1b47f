//! Validate a program document.

use std::path::PathBuf;

use director_program_model::{InMemoryProgramStore, ProgramStore};

pub fn run(program: PathBuf) -> anyhow::Result<()> {
    println!("Validating program at: {}", program.display());

    let store = InMemoryProgramStore::load(&program)
        .map_err(|e| anyhow::anyhow!("Failed to load program: {e}"))?;
    let doc = store.to_document();

    println!("  Plans: {}", doc.plans.len());
    println!("  Schedules: {}", doc.schedules.len());
    println!("  Layouts: {}", doc.layouts.len());

    let mut issues = Vec::new();
    for schedule in &doc.schedules {
        if let Some(plan_id) = &schedule.plan_id {
            if store.plan(plan_id).is_none() {
                issues.push(format!("schedule {}: unknown plan {plan_id}", schedule.id));
            }
        }
    }
    for layout in &doc.layouts {
        if let Some(plan_id) = &layout.plan_id {
            if store.plan(plan_id).is_none() {
                issues.push(format!("layout {}: unknown plan {plan_id}", layout.id));
            }
        }
        for element in &layout.elements {
            let rect = element.rect();
            if rect.is_empty() {
                issues.push(format!("layout {}: element {} has no area", layout.id, element.id()));
            }
        }
    }

    if issues.is_empty() {
        println!("\nProgram is valid.");
    } else {
        println!("\nValidation issues:");
        for issue in &issues {
            println!("  - {issue}");
        }
        println!("\n{} issue(s) found.", issues.len());
    }
    Ok(())
}
