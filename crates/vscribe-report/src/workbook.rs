//! Workbook generation.
//!
//! Two sheets: "Video Analysis" with one row per scene (formula-based
//! numbering, timecode, embedded screenshot, OCR text, narration), and
//! "Statistics" with totals, rates, video metadata, the detection
//! parameters used, and any accumulated processing warnings.

use std::path::Path;

use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Image, Workbook, Worksheet};
use tracing::info;

use vscribe_models::{format_timecode, DetectionMode, Scene, VideoMetadata};

use crate::error::{ReportError, ReportResult};

/// Embedded screenshot width in pixels.
pub const SCREENSHOT_WIDTH_PX: u32 = 320;

/// Approximate pixels per character at the default font.
const PX_PER_CHAR: u32 = 7;

/// Points per pixel for row heights.
const POINTS_PER_PX: f64 = 0.75;

const LIGHT_GREY: Color = Color::RGB(0xF2F2F2);
const BORDER_GREY: Color = Color::RGB(0xBFBFBF);
const HEADER_FILL: Color = Color::RGB(0xD9E1F2);
const AMBER: Color = Color::RGB(0xFFC000);
const PLACEHOLDER_GREY: Color = Color::RGB(0x808080);

const OCR_PLACEHOLDER: &str = "(no text detected)";
const NARRATION_PLACEHOLDER: &str = "(no narration)";

/// Everything the generator needs for one report.
pub struct ReportInput {
    /// Ordered scenes with `ocr_text` and `narration_text` filled
    pub scenes: Vec<Scene>,
    /// PNG bytes per scene, parallel to `scenes`
    pub screenshots: Vec<Option<Vec<u8>>>,
    pub video: VideoMetadata,
    pub detection_mode: DetectionMode,
    /// (label, value) pairs describing the detection parameters used
    pub detection_params: Vec<(String, String)>,
    /// Overlay lines removed by the persistent-overlay filter
    pub removed_overlays: Vec<String>,
    /// Non-fatal warnings accumulated during processing
    pub warnings: Vec<String>,
    /// Transcript segment count
    pub segment_count: u32,
    /// Total transcript length in characters
    pub transcription_length_chars: u32,
}

/// Bookkeeping returned after generation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSummary {
    pub total_scenes: u32,
    pub scenes_with_ocr: u32,
    pub scenes_with_narration: u32,
    pub ocr_result_count: u32,
}

/// Generate the workbook at `out_path`.
pub fn generate_report(input: &ReportInput, out_path: &Path) -> ReportResult<ReportSummary> {
    let mut workbook = Workbook::new();

    let summary = summarize(input);
    write_analysis_sheet(workbook.add_worksheet(), input)?;
    write_statistics_sheet(workbook.add_worksheet(), input, &summary)?;

    workbook.save(out_path)?;
    info!(
        scenes = summary.total_scenes,
        path = %out_path.display(),
        "Report workbook written"
    );
    Ok(summary)
}

fn summarize(input: &ReportInput) -> ReportSummary {
    let scenes_with_ocr = input.scenes.iter().filter(|s| !s.ocr_text.is_empty()).count() as u32;
    let scenes_with_narration = input
        .scenes
        .iter()
        .filter(|s| !s.narration_text.is_empty())
        .count() as u32;
    ReportSummary {
        total_scenes: input.scenes.len() as u32,
        scenes_with_ocr,
        scenes_with_narration,
        ocr_result_count: scenes_with_ocr,
    }
}

fn write_analysis_sheet(sheet: &mut Worksheet, input: &ReportInput) -> ReportResult<()> {
    sheet.set_name("Video Analysis")?;

    let header = Format::new()
        .set_bold()
        .set_background_color(HEADER_FILL)
        .set_border(FormatBorder::Thin)
        .set_border_color(BORDER_GREY)
        .set_align(FormatAlign::Center)
        .set_align(FormatAlign::VerticalCenter);

    for (col, title) in ["Scene #", "Timecode", "Screenshot", "OCR Text", "NA Text"]
        .iter()
        .enumerate()
    {
        sheet.write_string_with_format(0, col as u16, *title, &header)?;
    }
    sheet.set_freeze_panes(1, 0)?;

    // Screenshot column is sized to fit the embedded image
    let col_chars = SCREENSHOT_WIDTH_PX.div_ceil(PX_PER_CHAR);
    sheet.set_column_width(0, 9)?;
    sheet.set_column_width(1, 11)?;
    sheet.set_column_width(2, col_chars as f64)?;
    sheet.set_column_width(3, 40)?;
    sheet.set_column_width(4, 40)?;

    let aspect_ratio = input.video.aspect_ratio();
    let image_height = (SCREENSHOT_WIDTH_PX as f64 / aspect_ratio).round() as u32;
    let row_height_points = (image_height as f64 * POINTS_PER_PX).round();
    let cell_width_px = col_chars * PX_PER_CHAR;
    let cell_height_px = (row_height_points / POINTS_PER_PX).round() as u32;

    for (i, scene) in input.scenes.iter().enumerate() {
        let row = (i + 1) as u32;
        let (base, italic) = row_formats(i);

        // Numbering via formula so deleting a row renumbers the rest
        sheet.write_formula_with_format(row, 0, "=ROW()-1", &base)?;
        sheet.write_string_with_format(row, 1, &scene.timecode, &base)?;
        sheet.set_row_height(row, row_height_points)?;

        // The screenshot cell itself gets the border/fill, the image
        // floats over it centered via pixel offsets
        sheet.write_string_with_format(row, 2, "", &base)?;
        if let Some(bytes) = input.screenshots.get(i).and_then(|b| b.as_ref()) {
            let image = Image::new_from_buffer(bytes)
                .map_err(|e| ReportError::BadScreenshot {
                    scene_number: scene.scene_number,
                    message: e.to_string(),
                })?
                .set_scale_to_size(SCREENSHOT_WIDTH_PX as f64, image_height as f64, false);

            let x_offset = cell_width_px.saturating_sub(SCREENSHOT_WIDTH_PX) / 2;
            let y_offset = cell_height_px.saturating_sub(image_height) / 2;
            sheet.insert_image_with_offset(row, 2, &image, x_offset, y_offset)?;
        }

        write_text_or_placeholder(sheet, row, 3, &scene.ocr_text, OCR_PLACEHOLDER, &base, &italic)?;
        write_text_or_placeholder(
            sheet,
            row,
            4,
            &scene.narration_text,
            NARRATION_PLACEHOLDER,
            &base,
            &italic,
        )?;
    }

    Ok(())
}

fn row_formats(index: usize) -> (Format, Format) {
    let mut base = Format::new()
        .set_border(FormatBorder::Thin)
        .set_border_color(BORDER_GREY)
        .set_align(FormatAlign::VerticalCenter)
        .set_text_wrap();
    if index % 2 == 1 {
        base = base.set_background_color(LIGHT_GREY);
    }
    let italic = base.clone().set_italic().set_font_color(PLACEHOLDER_GREY);
    (base, italic)
}

fn write_text_or_placeholder(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    text: &str,
    placeholder: &str,
    base: &Format,
    italic: &Format,
) -> ReportResult<()> {
    if text.is_empty() {
        sheet.write_string_with_format(row, col, placeholder, italic)?;
    } else {
        sheet.write_string_with_format(row, col, text, base)?;
    }
    Ok(())
}

fn write_statistics_sheet(
    sheet: &mut Worksheet,
    input: &ReportInput,
    summary: &ReportSummary,
) -> ReportResult<()> {
    sheet.set_name("Statistics")?;
    sheet.set_column_width(0, 34)?;
    sheet.set_column_width(1, 40)?;

    let section = Format::new().set_bold().set_background_color(HEADER_FILL);
    let label = Format::new();
    let amber_section = Format::new().set_bold().set_background_color(AMBER);

    let mut row: u32 = 0;
    let write_pair = |sheet: &mut Worksheet, r: u32, name: &str, value: String| -> ReportResult<()> {
        sheet.write_string_with_format(r, 0, name, &label)?;
        sheet.write_string(r, 1, &value)?;
        Ok(())
    };

    sheet.write_string_with_format(row, 0, "Totals", &section)?;
    row += 1;
    write_pair(sheet, row, "Total scenes", summary.total_scenes.to_string())?;
    row += 1;
    write_pair(sheet, row, "Scenes with OCR text", summary.scenes_with_ocr.to_string())?;
    row += 1;
    write_pair(
        sheet,
        row,
        "Scenes with narration",
        summary.scenes_with_narration.to_string(),
    )?;
    row += 1;
    write_pair(sheet, row, "OCR hit rate", percent(summary.scenes_with_ocr, summary.total_scenes))?;
    row += 1;
    write_pair(
        sheet,
        row,
        "Narration coverage",
        percent(summary.scenes_with_narration, summary.total_scenes),
    )?;
    row += 1;
    write_pair(sheet, row, "Transcript segments", input.segment_count.to_string())?;
    row += 1;
    write_pair(
        sheet,
        row,
        "Transcript length (chars)",
        input.transcription_length_chars.to_string(),
    )?;
    row += 2;

    sheet.write_string_with_format(row, 0, "Video", &section)?;
    row += 1;
    write_pair(sheet, row, "Duration", format_timecode(input.video.duration))?;
    row += 1;
    write_pair(
        sheet,
        row,
        "Resolution",
        format!("{}x{}", input.video.width, input.video.height),
    )?;
    row += 1;
    write_pair(sheet, row, "Aspect ratio", format!("{:.3}", input.video.aspect_ratio()))?;
    row += 1;
    write_pair(sheet, row, "Audio stream", yes_no(input.video.has_audio))?;
    row += 2;

    sheet.write_string_with_format(row, 0, "Detection Parameters", &section)?;
    row += 1;
    write_pair(sheet, row, "Detection mode", input.detection_mode.to_string())?;
    row += 1;
    for (name, value) in &input.detection_params {
        write_pair(sheet, row, name, value.clone())?;
        row += 1;
    }

    if !input.removed_overlays.is_empty() {
        row += 1;
        sheet.write_string_with_format(row, 0, "Removed Persistent Overlays", &section)?;
        row += 1;
        for line in &input.removed_overlays {
            sheet.write_string(row, 0, line)?;
            row += 1;
        }
    }

    if !input.warnings.is_empty() {
        row += 1;
        sheet.write_string_with_format(row, 0, "Processing Warnings", &amber_section)?;
        row += 1;
        for warning in &input.warnings {
            sheet.write_string(row, 0, warning)?;
            row += 1;
        }
    }

    Ok(())
}

fn percent(part: u32, total: u32) -> String {
    if total == 0 {
        "0.0%".to_string()
    } else {
        format!("{:.1}%", part as f64 * 100.0 / total as f64)
    }
}

fn yes_no(v: bool) -> String {
    if v { "yes" } else { "no" }.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Minimal valid 1x1 PNG.
    const TINY_PNG: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48,
        0x44, 0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00,
        0x00, 0x1F, 0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78,
        0x9C, 0x63, 0x60, 0x00, 0x00, 0x00, 0x02, 0x00, 0x01, 0xFF, 0xFF, 0x03, 0x00, 0x00,
        0x06, 0x00, 0x05, 0x57, 0xBF, 0xAB, 0xD4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E,
        0x44, 0xAE, 0x42, 0x60, 0x82,
    ];

    fn input(scene_specs: &[(&str, &str)]) -> ReportInput {
        let mut scenes = Vec::new();
        let mut screenshots = Vec::new();
        for (i, (ocr, narration)) in scene_specs.iter().enumerate() {
            let start = i as f64 * 5.0;
            let mut scene = Scene::new(i as u32 + 1, start, start + 5.0);
            scene.ocr_text = ocr.to_string();
            scene.narration_text = narration.to_string();
            scenes.push(scene);
            screenshots.push(Some(TINY_PNG.to_vec()));
        }
        ReportInput {
            scenes,
            screenshots,
            video: VideoMetadata {
                width: 1280,
                height: 720,
                duration: 30.0,
                has_audio: true,
            },
            detection_mode: DetectionMode::Standard,
            detection_params: vec![("Scene thresholds".into(), "0.03 / 0.05 / 0.10".into())],
            removed_overlays: vec![],
            warnings: vec![],
            segment_count: 2,
            transcription_length_chars: 24,
        }
    }

    #[test]
    fn test_generate_writes_valid_zip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.xlsx");

        let summary = generate_report(&input(&[("text", "talk"), ("", "")]), &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        // OOXML containers are zip archives
        assert_eq!(&bytes[0..2], b"PK");
        assert_eq!(summary.total_scenes, 2);
    }

    #[test]
    fn test_summary_counts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.xlsx");

        let summary = generate_report(
            &input(&[("caption", "narration"), ("", "narration"), ("caption", "")]),
            &path,
        )
        .unwrap();

        assert_eq!(summary.total_scenes, 3);
        assert_eq!(summary.scenes_with_ocr, 2);
        assert_eq!(summary.scenes_with_narration, 2);
        // Scenes with and without narration partition the total
        let without = summary.total_scenes - summary.scenes_with_narration;
        assert_eq!(summary.scenes_with_narration + without, summary.total_scenes);
    }

    #[test]
    fn test_single_scene_report() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("single.xlsx");

        let summary = generate_report(&input(&[("", "")]), &path).unwrap();
        assert_eq!(summary.total_scenes, 1);
        assert!(path.exists());
    }

    #[test]
    fn test_missing_screenshot_is_tolerated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("noshot.xlsx");

        let mut report_input = input(&[("a", "b")]);
        report_input.screenshots[0] = None;
        generate_report(&report_input, &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_warnings_section_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("warn.xlsx");

        let mut report_input = input(&[("a", "b")]);
        report_input.warnings = vec!["audio preprocessing failed".into()];
        report_input.removed_overlays = vec!["Channel42".into()];
        generate_report(&report_input, &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_column_width_matches_screenshot() {
        assert_eq!(SCREENSHOT_WIDTH_PX.div_ceil(PX_PER_CHAR), 46);
    }

    #[test]
    fn test_percent_formatting() {
        assert_eq!(percent(1, 3), "33.3%");
        assert_eq!(percent(0, 0), "0.0%");
    }
}
