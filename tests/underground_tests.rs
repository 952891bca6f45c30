use bidsheet::cell::{Field, Side};
use bidsheet::codec::Envelope;
use bidsheet::editor::READONLY_WARNING;
use bidsheet::formula::{NEGATIVE_WARNING, PERCENT_WARNING};
use bidsheet::template::builtin;
use bidsheet::underground::{UndergroundWorksheet, sheet1_config, sheet2_config};
use bidsheet::worksheet::{EditResult, EditTarget, Worksheet, WorksheetKind};
use serde_json::json;

fn underground() -> UndergroundWorksheet {
    match builtin(WorksheetKind::Underground) {
        bidsheet::template::WorksheetMetadata::Underground(metadata) => {
            UndergroundWorksheet::new(metadata)
        }
        other => panic!("unexpected metadata {:?}", other.kind()),
    }
}

/// Grid target by spreadsheet row; template rows are contiguous from `first`.
fn grid(sheet: u8, first: u32, excel_row: u32, side: Side, field: Field) -> EditTarget {
    EditTarget::Grid {
        sheet,
        row_id: (excel_row - first) as usize,
        side,
        field,
    }
}

fn edit(worksheet: &mut UndergroundWorksheet, target: EditTarget, value: &str) -> EditResult {
    let result = worksheet.apply_edit(&target, value).expect("edit target exists");
    if let EditResult::Applied { last_edited } = &result {
        worksheet.recalculate(last_edited.as_ref());
    }
    result
}

#[test]
fn test_fresh_worksheet_totals_zero() {
    let worksheet = underground();
    assert_eq!(worksheet.total(), 0.0);

    // Empty rate cells show the rate in use
    let sheet2 = worksheet.sheet2();
    assert_eq!(sheet2.unit_price_text(73, Side::Right), "0.0825");
    assert_eq!(sheet2.unit_price_text(74, Side::Right), "0.0300");
    assert_eq!(sheet2.unit_price_text(92, Side::Right), "0.67");
    assert_eq!(sheet2.unit_price_text(122, Side::Left), "37.09");
    println!("✓ Fresh Underground worksheet is empty with default rates");
}

#[test]
fn test_sheet1_item_flows_into_total() {
    let mut worksheet = underground();

    let result = edit(&mut worksheet, grid(1, 5, 5, Side::Left, Field::Quantity), "10");
    assert!(matches!(result, EditResult::Applied { .. }));

    let row = worksheet.sheet1().row(5).expect("row 5");
    assert_eq!(row.left.gross, "385.00");

    let t = worksheet.totals();
    assert_eq!(t.sheet1_subtotal, 385.0);
    assert_eq!(t.grand_total_material, 385.0);
    assert_eq!(t.sales_tax, 31.76);
    assert_eq!(t.cartage, 11.55);
    assert_eq!(t.material_equip_subtotal, 428.31);
    assert_eq!(worksheet.total(), 428.31);

    let sheet2 = worksheet.sheet2();
    assert_eq!(sheet2.cell(71, Side::Left).map(|c| c.gross.as_str()), Some("385.00"));
    assert_eq!(sheet2.cell(73, Side::Right).map(|c| c.gross.as_str()), Some("31.76"));
    assert_eq!(sheet2.cell(102, Side::Right).map(|c| c.gross.as_str()), Some("428.31"));
    assert_eq!(worksheet.summary()["grandTotal"], "428.31");
    println!("✓ 10 × 38.50 becomes a 428.31 underground price");
}

#[test]
fn test_labor_overhead_and_gain() {
    let mut worksheet = underground();

    // 5 layouts at 2 hrs each = 10 labor hours
    edit(&mut worksheet, grid(2, 71, 96, Side::Left, Field::Quantity), "5");
    let t = *worksheet.totals();
    assert_eq!(t.total_labor_hours, 10.0);
    assert_eq!(t.labor_cost, 370.9);
    assert_eq!(t.field_eng_fab_total, 370.9);
    assert_eq!(t.assessments, 248.5);
    assert_eq!(t.subtotal_before_gain, 619.4);

    edit(&mut worksheet, grid(2, 71, 97, Side::Right, Field::UnitPrice), "0.1");
    edit(&mut worksheet, grid(2, 71, 100, Side::Right, Field::UnitPrice), "0.1");
    let t = *worksheet.totals();
    assert_eq!(t.overhead, 61.94);
    assert_eq!(t.subtotal_after_overhead, 681.34);
    assert_eq!(t.gain, 68.13);
    assert_eq!(worksheet.total(), 749.47);
    println!("✓ Labor, assessments, overhead and gain chain in order");
}

#[test]
fn test_edit_validation() {
    let mut worksheet = underground();

    let result = edit(&mut worksheet, grid(1, 5, 5, Side::Left, Field::Quantity), "-3");
    assert_eq!(
        result,
        EditResult::Rejected {
            warning: NEGATIVE_WARNING.to_string()
        }
    );
    assert_eq!(worksheet.sheet1().row(5).map(|r| r.left.quantity.as_str()), Some(""));

    let result = edit(&mut worksheet, grid(2, 71, 97, Side::Right, Field::UnitPrice), "1.5");
    assert_eq!(
        result,
        EditResult::Rejected {
            warning: PERCENT_WARNING.to_string()
        }
    );

    // Calculated cells refuse input
    let result = edit(&mut worksheet, grid(2, 71, 73, Side::Right, Field::Quantity), "5");
    assert_eq!(
        result,
        EditResult::Rejected {
            warning: READONLY_WARNING.to_string()
        }
    );

    // Comment rows refuse input too
    let result = edit(&mut worksheet, grid(2, 71, 106, Side::Right, Field::Description), "x");
    assert!(matches!(result, EditResult::Rejected { .. }));

    let bad = EditTarget::Grid {
        sheet: 3,
        row_id: 0,
        side: Side::Left,
        field: Field::Quantity,
    };
    assert!(worksheet.apply_edit(&bad, "1").is_err());
    println!("✓ Negative, percent and read-only edits are refused");
}

#[test]
fn test_snapshot_restores_same_totals() {
    let mut worksheet = underground();
    edit(&mut worksheet, grid(1, 5, 5, Side::Left, Field::Quantity), "10");
    edit(&mut worksheet, grid(1, 5, 5, Side::Right, Field::Quantity), "2");

    let body = worksheet.collect().expect("collect");
    let blob = Envelope::new(WorksheetKind::Underground, "OPP-1", body)
        .encode()
        .expect("encode");

    let envelope = Envelope::decode(&blob).expect("decode");
    assert_eq!(envelope.kind(), Some(WorksheetKind::Underground));

    let mut restored = underground();
    restored.restore(&envelope.body_value()).expect("restore");
    assert_eq!(restored.total(), worksheet.total());
    assert_eq!(
        restored.sheet1().row(5).map(|r| r.right.gross.as_str()),
        Some("7700.00")
    );

    // Reset goes back to the template
    restored.reset();
    assert_eq!(restored.total(), 0.0);
    println!("✓ Underground snapshot round trip keeps totals");
}

#[test]
fn test_row_tables_come_from_the_worksheet() {
    let metadata = match builtin(WorksheetKind::Underground) {
        bidsheet::template::WorksheetMetadata::Underground(metadata) => metadata,
        other => panic!("unexpected metadata {:?}", other.kind()),
    };
    let mut sheet1 = sheet1_config();
    sheet1.whole_number = sheet1.whole_number.with(5, Side::Left, Field::Gross);
    sheet1.calculated = sheet1.calculated.with_rows(&[6], Side::Left);
    let mut worksheet = UndergroundWorksheet::with_configs(metadata, [sheet1, sheet2_config()]);

    edit(&mut worksheet, grid(1, 5, 5, Side::Left, Field::Quantity), "3");
    let row = worksheet.sheet1().row(5).expect("row 5");
    assert_eq!(row.left.gross, "116", "Whole-number gross shows rounded");
    assert_eq!(row.left.gross_raw, "115.50");
    assert_eq!(worksheet.totals().sheet1_subtotal, 115.5);

    let result = edit(&mut worksheet, grid(1, 5, 6, Side::Left, Field::Quantity), "2");
    assert_eq!(
        result,
        EditResult::Rejected {
            warning: READONLY_WARNING.to_string()
        }
    );

    // The stock tables still show cents
    let mut stock = underground();
    edit(&mut stock, grid(1, 5, 5, Side::Left, Field::Quantity), "3");
    assert_eq!(stock.sheet1().row(5).map(|r| r.left.gross.as_str()), Some("115.50"));
    println!("✓ Injected row tables drive rounding and read-only cells");
}

#[test]
fn test_oversized_excel_row_falls_back_to_position() {
    let mut worksheet = underground();
    let body = json!({
        "sheet1": {
            "lineItems": [
                { "excelRow": 4294967302u64, "left": { "quantity": "3" } },
            ]
        }
    });
    worksheet.restore(&body).expect("restore");

    // 2^32 + 6 must not wrap onto row 6
    let sheet1 = worksheet.sheet1();
    assert_eq!(sheet1.row(6).map(|r| r.left.quantity.as_str()), Some(""));
    assert_eq!(sheet1.row(5).map(|r| r.left.gross.as_str()), Some("115.50"));
    println!("✓ Out-of-range excelRow restores by position");
}
