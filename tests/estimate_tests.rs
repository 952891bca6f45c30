use bidsheet::cell::{Cell, Field, Side};
use bidsheet::editor::READONLY_WARNING;
use bidsheet::estimate::{EstimateWorksheet, SECTION1_SUBTOTAL, estimate_config};
use bidsheet::formula::{PERCENT_WARNING, round_to};
use bidsheet::template::{WorksheetMetadata, builtin};
use bidsheet::worksheet::{EditResult, EditTarget, Worksheet, WorksheetKind};
use serde_json::json;

/// First spreadsheet row of each built-in section.
const FIRST_ROW: [u32; 3] = [5, 77, 133];

fn estimate() -> EstimateWorksheet {
    match builtin(WorksheetKind::Estimate) {
        WorksheetMetadata::Estimate(metadata) => EstimateWorksheet::new(metadata),
        other => panic!("unexpected metadata {:?}", other.kind()),
    }
}

fn edit(
    worksheet: &mut EstimateWorksheet,
    section: u8,
    excel_row: u32,
    side: Side,
    field: Field,
    value: &str,
) -> EditResult {
    let target = EditTarget::Grid {
        sheet: section,
        row_id: (excel_row - FIRST_ROW[usize::from(section) - 1]) as usize,
        side,
        field,
    };
    let result = worksheet.apply_edit(&target, value).expect("edit target exists");
    if let EditResult::Applied { last_edited } = &result {
        worksheet.recalculate(last_edited.as_ref());
    }
    result
}

fn cell(worksheet: &EstimateWorksheet, section: u8, excel_row: u32, side: Side) -> Cell {
    worksheet
        .section(section)
        .and_then(|sheet| sheet.cell(excel_row, side))
        .cloned()
        .unwrap_or_else(|| panic!("no cell at section {} row {}", section, excel_row))
}

#[test]
fn test_head_count_range_sum() {
    let mut worksheet = estimate();
    edit(&mut worksheet, 1, 5, Side::Left, Field::Quantity, "100");
    edit(&mut worksheet, 1, 6, Side::Left, Field::Quantity, "70");

    let heads = cell(&worksheet, 1, 22, Side::Left);
    assert_eq!(heads.quantity, "170.00");
    assert!(heads.quantity_readonly, "Total heads is a formula cell");
    assert!(heads.gross_readonly);
    assert_eq!(heads.gross, "3197.50");

    // Row 22 feeds the section subtotal, the item rows do not count twice
    assert_eq!(cell(&worksheet, 1, 69, Side::Left).gross, "3197.50");
    assert_eq!(cell(&worksheet, 3, 157, Side::Left).size, "170.00");
    println!("✓ Total heads sums rows 5-21");
}

#[test]
fn test_cross_section_material_total() {
    let mut worksheet = estimate();
    edit(&mut worksheet, 1, 5, Side::Left, Field::UnitPrice, "10");
    edit(&mut worksheet, 1, 5, Side::Left, Field::Quantity, "10");
    edit(&mut worksheet, 2, 77, Side::Left, Field::UnitPrice, "5");
    edit(&mut worksheet, 2, 77, Side::Left, Field::Quantity, "10");

    assert_eq!(cell(&worksheet, 1, 69, Side::Left).gross, "100.00");
    assert_eq!(cell(&worksheet, 2, 125, Side::Left).gross, "50.00");
    assert_eq!(cell(&worksheet, 3, 133, Side::Left).gross, "150.00");
    println!("✓ Sections 1 and 2 feed section 3 row 133");
}

#[test]
fn test_section3_markup_chain() {
    let mut worksheet = estimate();
    edit(&mut worksheet, 1, 5, Side::Left, Field::Quantity, "10");

    // 10 × 18.50 of material, 40 default engineering hours, BIM at half the heads
    assert_eq!(cell(&worksheet, 3, 133, Side::Left).gross, "185.00");
    assert_eq!(cell(&worksheet, 3, 185, Side::Left).gross, "3800.00");
    assert_eq!(cell(&worksheet, 3, 185, Side::Left).size, "4.00");
    let bim = cell(&worksheet, 3, 186, Side::Left);
    assert_eq!(bim.quantity, "5");
    assert_eq!(bim.gross, "475.00");
    assert_eq!(bim.size, "0.50");
    assert_eq!(cell(&worksheet, 3, 189, Side::Left).gross, "4275.00");

    assert_eq!(cell(&worksheet, 3, 135, Side::Right).gross, "18.50");
    assert_eq!(cell(&worksheet, 3, 152, Side::Right).gross, "203.50");
    assert_eq!(cell(&worksheet, 3, 153, Side::Right).gross, "4275.00");
    assert_eq!(cell(&worksheet, 3, 160, Side::Right).gross, "4478.50");

    let overhead = round_to(4478.5 * 0.15, 2);
    let subtotal = round_to(4478.5 + overhead, 2);
    let gain = round_to(subtotal * 0.15, 2);
    let quote = round_to(subtotal + gain, 2);
    assert_eq!(cell(&worksheet, 3, 161, Side::Right).gross_value(), overhead);
    assert_eq!(cell(&worksheet, 3, 163, Side::Right).gross_value(), subtotal);
    assert_eq!(cell(&worksheet, 3, 164, Side::Right).gross_value(), gain);
    assert_eq!(cell(&worksheet, 3, 166, Side::Right).gross_value(), quote);

    let margin = cell(&worksheet, 3, 168, Side::Right).quantity;
    assert_eq!(margin.split('.').nth(1).map(str::len), Some(4), "Margin has 4 decimals");

    // Bond floor is 100 on small quotes
    assert!(quote / 1000.0 * 1.5 < 100.0);
    assert_eq!(cell(&worksheet, 3, 169, Side::Right).quantity, "100.00");

    // Per-head figures divide by the headcount
    let direct_per_head = cell(&worksheet, 3, 174, Side::Right);
    assert_eq!(direct_per_head.unit_price, "10.00");
    assert_eq!(direct_per_head.gross, "447.85");
    println!("✓ Section 3 markup chain is consistent");
}

#[test]
fn test_percent_and_negative_rules() {
    let mut worksheet = estimate();

    let result = edit(&mut worksheet, 3, 161, Side::Right, Field::UnitPrice, "1.5");
    assert_eq!(
        result,
        EditResult::Rejected {
            warning: PERCENT_WARNING.to_string()
        }
    );
    assert_eq!(cell(&worksheet, 3, 161, Side::Right).unit_price, "0.15");

    let result = edit(&mut worksheet, 3, 135, Side::Right, Field::UnitPrice, "-0.1");
    assert!(matches!(result, EditResult::Rejected { .. }));

    let result = edit(&mut worksheet, 3, 161, Side::Right, Field::UnitPrice, "0.2");
    assert!(matches!(result, EditResult::Applied { .. }));

    // Credits are allowed on estimate lines
    let result = edit(&mut worksheet, 1, 5, Side::Left, Field::Quantity, "-2");
    assert!(matches!(result, EditResult::Applied { .. }));
    assert_eq!(cell(&worksheet, 1, 5, Side::Left).gross, "-37.00");
    println!("✓ Percent cells take fractions, negatives are allowed");
}

#[test]
fn test_bim_quantity_is_hybrid() {
    let mut worksheet = estimate();
    edit(&mut worksheet, 1, 5, Side::Left, Field::Quantity, "10");
    assert_eq!(cell(&worksheet, 3, 186, Side::Left).quantity, "5");

    // A typed quantity sticks through later recalculations
    edit(&mut worksheet, 3, 186, Side::Left, Field::Quantity, "12");
    let bim = cell(&worksheet, 3, 186, Side::Left);
    assert!(bim.quantity_user_entered);
    assert_eq!(bim.gross, "1140.00");

    edit(&mut worksheet, 1, 5, Side::Left, Field::Quantity, "20");
    let bim = cell(&worksheet, 3, 186, Side::Left);
    assert_eq!(bim.quantity, "12");
    assert_eq!(bim.gross, "1140.00");

    // Clearing it hands the cell back to the formula
    edit(&mut worksheet, 3, 186, Side::Left, Field::Quantity, "");
    assert!(!cell(&worksheet, 3, 186, Side::Left).quantity_user_entered);
    assert_eq!(cell(&worksheet, 3, 186, Side::Left).gross, "950.00");

    edit(&mut worksheet, 1, 7, Side::Left, Field::Quantity, "1");
    let bim = cell(&worksheet, 3, 186, Side::Left);
    assert_eq!(bim.quantity, "11");
    assert_eq!(bim.quantity_raw, "10.50");
    assert_eq!(bim.gross, "997.50");
    println!("✓ BIM quantity follows the headcount until typed over");
}

#[test]
fn test_fabrication_size_is_hybrid() {
    let mut worksheet = estimate();
    edit(&mut worksheet, 1, 5, Side::Left, Field::Quantity, "10");
    edit(&mut worksheet, 3, 187, Side::Left, Field::Quantity, "20");

    let fabrication = cell(&worksheet, 3, 187, Side::Left);
    assert_eq!(fabrication.gross, "900.00");
    assert_eq!(fabrication.size, "2.00");

    edit(&mut worksheet, 3, 187, Side::Left, Field::Size, "3");
    edit(&mut worksheet, 1, 5, Side::Left, Field::Quantity, "40");
    let fabrication = cell(&worksheet, 3, 187, Side::Left);
    assert!(fabrication.size_user_entered);
    assert_eq!(fabrication.size, "3");
    println!("✓ Fabrication size keeps a typed value");
}

#[test]
fn test_snapshot_round_trip_keeps_hybrid_flags() {
    let mut worksheet = estimate();
    edit(&mut worksheet, 1, 5, Side::Left, Field::Quantity, "10");
    edit(&mut worksheet, 1, 5, Side::Right, Field::Quantity, "4");
    edit(&mut worksheet, 3, 186, Side::Left, Field::Quantity, "12");

    let body = worksheet.collect().expect("collect");
    let items = body["section3"].as_array().expect("section3 items");
    let bim = items
        .iter()
        .find(|item| item["excelRow"] == 186 && item["column"] == "Left")
        .expect("BIM item");
    assert_eq!(bim["quantityUserEntered"], true);
    assert_eq!(bim["gross"], 1140.0);

    let mut restored = estimate();
    restored.restore(&body).expect("restore");
    assert!((restored.total() - worksheet.total()).abs() < 0.005);
    assert_eq!(cell(&restored, 3, 186, Side::Left).quantity, "12");
    assert_eq!(
        restored.summary()["grandTotal"],
        worksheet.summary()["grandTotal"]
    );
    println!("✓ Estimate snapshot restores values and hybrid flags");
}

#[test]
fn test_row_tables_come_from_the_worksheet() {
    let metadata = match builtin(WorksheetKind::Estimate) {
        WorksheetMetadata::Estimate(metadata) => metadata,
        other => panic!("unexpected metadata {:?}", other.kind()),
    };
    let mut config = estimate_config();
    config.whole_number = config
        .whole_number
        .with(SECTION1_SUBTOTAL, Side::Left, Field::Gross);
    config.calculated = config.calculated.with_rows(&[6], Side::Left);
    let mut worksheet = EstimateWorksheet::with_config(metadata, config);

    edit(&mut worksheet, 1, 5, Side::Left, Field::Quantity, "3");
    let subtotal = cell(&worksheet, 1, SECTION1_SUBTOTAL, Side::Left);
    assert_eq!(subtotal.gross, "56");
    assert_eq!(subtotal.gross_raw, "55.50");

    let result = edit(&mut worksheet, 1, 6, Side::Left, Field::Quantity, "2");
    assert_eq!(
        result,
        EditResult::Rejected {
            warning: READONLY_WARNING.to_string()
        }
    );

    let mut stock = estimate();
    edit(&mut stock, 1, 5, Side::Left, Field::Quantity, "3");
    assert_eq!(cell(&stock, 1, SECTION1_SUBTOTAL, Side::Left).gross, "55.50");
    println!("✓ Injected row tables drive rounding and read-only cells");
}

#[test]
fn test_oversized_excel_row_falls_back_to_row_number() {
    let mut worksheet = estimate();
    let body = json!({
        "section1": [
            { "excelRow": 4294967302u64, "rowNumber": 1, "column": "Left", "quantity": 7 },
        ]
    });
    worksheet.restore(&body).expect("restore");

    // 2^32 + 6 must not wrap onto row 6
    assert_eq!(cell(&worksheet, 1, 6, Side::Left).quantity, "");
    assert_eq!(cell(&worksheet, 1, 5, Side::Left).quantity, "7");
    assert_eq!(cell(&worksheet, 1, 22, Side::Left).quantity, "7.00");
    println!("✓ Out-of-range excelRow restores by row number");
}
