//! Clinical case, imaging and report commands.

use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use clap::Args;
use oncovision_core::api::{report_file_name, ImageUpload};
use oncovision_core::models::{CaseQuery, ClinicalCase, ConfidenceBand, Malignancy, TargetState};
use tracing::debug;

use super::Context;

#[derive(Args, Debug)]
pub struct CasesArgs {
    /// Filter by case id
    #[arg(long)]
    pub case_id: Option<String>,

    /// Filter by patient id number
    #[arg(long)]
    pub patient_id: Option<String>,
}

#[derive(Args, Debug)]
pub struct AddCaseArgs {
    /// Identity document number of the patient
    pub patient_id: String,
}

#[derive(Args, Debug)]
pub struct CaseArgs {
    pub case_id: String,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    pub case_id: String,

    /// Image files (PNG, JPEG or DICOM)
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

#[derive(Args, Debug)]
pub struct SetStateArgs {
    /// Target state: ready or processing
    #[arg(value_parser = parse_target_state)]
    pub state: TargetState,

    #[arg(required = true)]
    pub image_ids: Vec<String>,
}

#[derive(Args, Debug)]
pub struct DeleteImagesArgs {
    #[arg(required = true)]
    pub image_ids: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ReportArgs {
    pub case_id: String,

    /// Image the report was generated from (used in the file name)
    pub image_id: String,

    /// Output path (default: reporte_tomografia_caso_<case>_<image>.pdf)
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

fn parse_target_state(s: &str) -> Result<TargetState, String> {
    TargetState::parse(s).ok_or_else(|| format!("expected `ready` or `processing`, got `{}`", s))
}

pub async fn list(args: CasesArgs, ctx: &Context) -> Result<()> {
    ctx.require_session()?;
    let query = CaseQuery {
        case_id: args.case_id,
        patient_id: args.patient_id,
    };
    let cases = ctx.api.list_cases(&query).await?;
    if ctx.print_json(&cases)? {
        return Ok(());
    }

    if cases.is_empty() {
        println!("No clinical cases found.");
        return Ok(());
    }
    println!("{:<10} {:<14} {:>7} {:>8}", "CASE", "PATIENT", "IMAGES", "NODULES");
    for case in &cases {
        println!(
            "{:<10} {:<14} {:>7} {:>8}",
            case.id, case.patient_id, case.medical_images_count, case.nodules_count
        );
    }
    Ok(())
}

pub async fn add(args: AddCaseArgs, ctx: &Context) -> Result<()> {
    ctx.require_session()?;
    ctx.api.create_case(&args.patient_id).await?;
    println!("Opened a clinical case for patient {}.", args.patient_id);
    Ok(())
}

pub async fn show(args: CaseArgs, ctx: &Context) -> Result<()> {
    ctx.require_session()?;
    let case = ctx.api.case_detail(&args.case_id).await?;
    if ctx.print_json(&case)? {
        return Ok(());
    }
    print_case(&case, ctx);
    Ok(())
}

fn print_case(case: &ClinicalCase, ctx: &Context) {
    println!("Case {} (patient {})", case.id, case.patient_id);
    if !case.description.is_empty() {
        println!("{}", case.description);
    }
    println!(
        "{} image(s), {} nodule(s)",
        case.medical_images.len(),
        case.nodule_count()
    );

    for image in &case.medical_images {
        println!();
        println!("  Image {} [{}]", image.id, image.state);
        let shown = if image.processed_image.is_empty() {
            &image.full_image
        } else {
            &image.processed_image
        };
        if !shown.is_empty() {
            match ctx.api.image_url(shown) {
                Ok(url) => println!("    {}", url),
                Err(e) => debug!(image = %image.id, error = %e, "Unusable image path"),
            }
        }
        for nodule in &image.lung_nodules {
            println!(
                "    nodule {}: {} {:.2}% ({}) at ({:.1}, {:.1}) {:.1}x{:.1}",
                nodule.id,
                malignancy_label(nodule.malignancy()),
                nodule.confidence_percent(),
                band_label(nodule.confidence_band()),
                nodule.x_position,
                nodule.y_position,
                nodule.width,
                nodule.height
            );
        }
    }
}

fn malignancy_label(m: Malignancy) -> &'static str {
    match m {
        Malignancy::Benign => "benign",
        Malignancy::Malignant => "malignant",
        Malignancy::Suspicious => "suspicious",
        Malignancy::Unknown => "unclassified",
    }
}

fn band_label(b: ConfidenceBand) -> &'static str {
    match b {
        ConfidenceBand::Low => "low",
        ConfidenceBand::Medium => "medium",
        ConfidenceBand::High => "high",
    }
}

pub async fn upload(args: UploadArgs, ctx: &Context) -> Result<()> {
    ctx.require_session()?;

    let mut images = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            bail!("Not a file: {}", path.display());
        };
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        images.push(ImageUpload::new(file_name, bytes));
    }

    let count = images.len();
    ctx.api.upload_images(&args.case_id, images).await?;
    println!("Uploaded {} image(s) to case {}.", count, args.case_id);
    Ok(())
}

pub async fn set_state(args: SetStateArgs, ctx: &Context) -> Result<()> {
    ctx.require_session()?;
    ctx.api.set_image_state(&args.image_ids, args.state).await?;
    let state = match args.state {
        TargetState::Ready => "ready",
        TargetState::Processing => "processing",
    };
    println!("Moved {} image(s) to {}.", args.image_ids.len(), state);
    Ok(())
}

pub async fn delete_images(args: DeleteImagesArgs, ctx: &Context) -> Result<()> {
    ctx.require_session()?;
    match args.image_ids.as_slice() {
        [single] => ctx.api.delete_image(single).await?,
        ids => ctx.api.delete_images(ids).await?,
    }
    println!("Deleted {} image(s).", args.image_ids.len());
    Ok(())
}

pub async fn report(args: ReportArgs, ctx: &Context) -> Result<()> {
    ctx.require_session()?;
    let pdf = ctx.api.case_report(&args.case_id).await?;

    let out = args
        .out
        .unwrap_or_else(|| PathBuf::from(report_file_name(&args.case_id, &args.image_id)));
    tokio::fs::write(&out, &pdf)
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;
    println!("Saved report to {} ({} bytes).", out.display(), pdf.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_state() {
        assert_eq!(parse_target_state("Ready"), Ok(TargetState::Ready));
        assert_eq!(parse_target_state("processing"), Ok(TargetState::Processing));
        assert!(parse_target_state("analyzed").is_err());
    }
}
