use anyhow::Result;
use colored::Colorize;
use inquire::{Confirm, Select, Text};

use reqforge_core::{EditChoice, QualityReport, RefinementIo, Requirement};

use crate::render;

/// Terminal side of a refinement session
pub struct InquireIo;

impl RefinementIo for InquireIo {
    fn read_text(&mut self, label: &str) -> Result<String> {
        Ok(Text::new(&format!("{}:", label)).prompt()?)
    }

    fn present(&mut self, requirement: &Requirement, report: &QualityReport) {
        println!();
        render::print_requirement(requirement);
        println!();
        render::print_report(report);
    }

    fn choose(&mut self, options: &[EditChoice]) -> Result<EditChoice> {
        Ok(Select::new("What would you like to do?", options.to_vec()).prompt()?)
    }

    fn show_detail(&mut self, report: &QualityReport) -> Result<()> {
        println!();
        for c in &report.criteria {
            println!(
                "{} {:.2}  {}",
                format!("{:<13}", c.criterion.name()).bold(),
                c.score,
                c.criterion.description().dimmed()
            );
            for line in &c.feedback {
                println!("    - {}", line);
            }
        }
        println!("Scored by: {}", report.source);
        Text::new("Press Enter to continue...").prompt()?;
        Ok(())
    }

    fn notify(&mut self, message: &str) {
        println!("{}", message.cyan());
    }
}

/// Asks before a destructive action unless `yes` was given
pub fn confirm(question: &str, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    Ok(Confirm::new(question).with_default(false).prompt()?)
}
