use bidsheet::cell::{CellRef, Field, Side};
use bidsheet::editor::{EditController, EditOutcome};
use bidsheet::formula::NEGATIVE_WARNING;
use bidsheet::template::builtin;
use bidsheet::worksheet::{EditTarget, Worksheet, WorksheetKind};
use std::time::Duration;
use tokio::sync::watch;

fn quantity_of_row5(value_side: Side) -> EditTarget {
    EditTarget::Grid {
        sheet: 1,
        row_id: 0,
        side: value_side,
        field: Field::Quantity,
    }
}

#[tokio::test(start_paused = true)]
async fn test_edit_publishes_total_and_marks_editing() {
    let mut worksheet = builtin(WorksheetKind::Underground).build();
    let mut controller = EditController::new(Duration::from_millis(1000));
    let (totals, receiver) = watch::channel(0.0);

    assert!(!controller.is_editing());
    let outcome = controller
        .on_cell_edit(worksheet.as_mut(), &quantity_of_row5(Side::Left), "10", &totals)
        .expect("edit applies");

    assert_eq!(
        outcome,
        EditOutcome::Applied {
            cell: Some(CellRef::new(5, Side::Left, Field::Quantity)),
            total: 428.31,
            notify: true,
        }
    );
    assert_eq!(*receiver.borrow(), 428.31);
    assert!(controller.is_editing(), "Editing flag is set by the edit");

    tokio::time::advance(Duration::from_millis(1100)).await;
    assert!(!controller.is_editing(), "Editing flag clears after the quiet period");
    println!("✓ Edits publish totals and decay the editing flag");
}

#[tokio::test(start_paused = true)]
async fn test_loading_edits_do_not_notify() {
    let mut worksheet = builtin(WorksheetKind::Underground).build();
    let mut controller = EditController::new(Duration::from_millis(1000));
    let (totals, _receiver) = watch::channel(0.0);

    controller.set_loading(true);
    let outcome = controller
        .on_cell_edit(worksheet.as_mut(), &quantity_of_row5(Side::Left), "1", &totals)
        .expect("edit applies");
    assert!(matches!(outcome, EditOutcome::Applied { notify: false, .. }));

    controller.set_loading(false);
    let outcome = controller
        .on_cell_edit(worksheet.as_mut(), &quantity_of_row5(Side::Left), "2", &totals)
        .expect("edit applies");
    assert!(matches!(outcome, EditOutcome::Applied { notify: true, .. }));
    println!("✓ Snapshot loading suppresses autosave notification");
}

#[tokio::test(start_paused = true)]
async fn test_rejected_edit_keeps_total() {
    let mut worksheet = builtin(WorksheetKind::Underground).build();
    let mut controller = EditController::new(Duration::from_millis(1000));
    let (totals, receiver) = watch::channel(0.0);

    controller
        .on_cell_edit(worksheet.as_mut(), &quantity_of_row5(Side::Left), "10", &totals)
        .expect("edit applies");
    let outcome = controller
        .on_cell_edit(worksheet.as_mut(), &quantity_of_row5(Side::Right), "-1", &totals)
        .expect("validation is not an error");

    assert_eq!(
        outcome,
        EditOutcome::Rejected {
            warning: NEGATIVE_WARNING.to_string()
        }
    );
    assert_eq!(*receiver.borrow(), 428.31);
    assert_eq!(worksheet.total(), 428.31);

    // Unknown targets are errors, not warnings
    let wrong_kind = EditTarget::DesignField {
        name: "jobName".to_string(),
    };
    assert!(
        controller
            .on_cell_edit(worksheet.as_mut(), &wrong_kind, "x", &totals)
            .is_err()
    );
    println!("✓ Rejected edits leave the model untouched");
}
