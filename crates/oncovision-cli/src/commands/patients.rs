//! Patient registry commands.

use anyhow::Result;
use clap::Args;
use oncovision_core::models::{CaseQuery, NewPatient, Patient, PatientQuery};
use serde_json::json;

use super::Context;

#[derive(Args, Debug)]
pub struct PatientsArgs {
    /// Filter by first name
    #[arg(long)]
    pub name: Option<String>,

    /// Filter by last name
    #[arg(long)]
    pub last_name: Option<String>,

    /// Filter by identity document number
    #[arg(long)]
    pub id_number: Option<String>,

    /// Filter by clinical history number
    #[arg(long)]
    pub clinical_history: Option<String>,
}

#[derive(Args, Debug)]
pub struct PatientArgs {
    /// Identity document number of the patient
    pub id_number: String,
}

#[derive(Args, Debug)]
pub struct AddPatientArgs {
    #[arg(long)]
    pub names: String,

    #[arg(long)]
    pub last_names: String,

    #[arg(long)]
    pub id_number: String,

    #[arg(long)]
    pub clinical_history: String,
}

pub async fn list(args: PatientsArgs, ctx: &Context) -> Result<()> {
    ctx.require_session()?;
    let query = PatientQuery {
        name: args.name,
        last_name: args.last_name,
        id_number: args.id_number,
        clinical_history: args.clinical_history,
    };
    let patients = ctx.api.list_patients(&query).await?;
    if ctx.print_json(&patients)? {
        return Ok(());
    }

    if patients.is_empty() {
        println!("No patients found.");
        return Ok(());
    }
    print_table(&patients);
    Ok(())
}

fn print_table(patients: &[Patient]) {
    let name_width = patients
        .iter()
        .map(|p| p.full_name.chars().count())
        .max()
        .unwrap_or(0)
        .max("NAME".len());

    println!("{:<14} {:<name_width$} {}", "ID", "NAME", "HISTORY", name_width = name_width);
    for p in patients {
        println!(
            "{:<14} {:<name_width$} {}",
            p.id_number,
            p.full_name,
            p.clinical_history,
            name_width = name_width
        );
    }
}

/// Patient record and their cases, fetched side by side.
pub async fn show(args: PatientArgs, ctx: &Context) -> Result<()> {
    ctx.require_session()?;
    let case_query = CaseQuery::for_patient(&args.id_number);
    let (patient, cases) = futures::try_join!(
        ctx.api.patient(&args.id_number),
        ctx.api.list_cases(&case_query),
    )?;

    if ctx.print_json(&json!({ "patient": patient, "cases": cases }))? {
        return Ok(());
    }

    println!("{} ({})", patient.full_name, patient.id_number);
    println!("Clinical history: {}", patient.clinical_history);
    println!();
    if cases.is_empty() {
        println!("No clinical cases.");
    } else {
        println!("{:<10} {:>7} {:>8}", "CASE", "IMAGES", "NODULES");
        for case in &cases {
            println!(
                "{:<10} {:>7} {:>8}",
                case.id, case.medical_images_count, case.nodules_count
            );
        }
    }
    Ok(())
}

pub async fn add(args: AddPatientArgs, ctx: &Context) -> Result<()> {
    ctx.require_session()?;
    let patient = NewPatient {
        names: args.names,
        last_names: args.last_names,
        id_number: args.id_number,
        clinical_history: args.clinical_history,
    };
    ctx.api.create_patient(&patient).await?;
    println!("Registered patient {} {} ({}).", patient.names, patient.last_names, patient.id_number);
    Ok(())
}
