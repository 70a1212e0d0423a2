//! Table tests: pipe tables in, pipe or HTML tables out

use crate::common::{parse, roundtrip, write};
use gfm_babel::model::{Alignment, CellAttrs};
use gfm_babel::{Document, Node, NodeKind};

fn cell_texts(table: &Node) -> Vec<Vec<String>> {
    table
        .content
        .iter()
        .map(|row| row.content.iter().map(Node::text_content).collect())
        .collect()
}

#[test]
fn test_pipe_table_structure() {
    let doc = parse("| Name | Value |\n|:----:|-------|\n| a | `b` |\n");
    let table = &doc.content[0];
    assert_eq!(table.kind, NodeKind::Table);
    assert_eq!(
        cell_texts(table),
        vec![
            vec!["Name".to_string(), "Value".to_string()],
            vec!["a".to_string(), "b".to_string()],
        ]
    );
    assert!(matches!(table.content[0].content[0].kind, NodeKind::TableHeader(_)));
    assert_eq!(
        table.content[1].content[0].kind,
        NodeKind::TableCell(CellAttrs {
            align: Some(Alignment::Center),
            ..CellAttrs::default()
        })
    );
    assert!(doc.validate().is_ok());
}

#[test]
fn test_ragged_tables_round_trip() {
    let source = "| a | b |\n|---|---|\n| only |";
    assert_eq!(roundtrip(source), source);
}

#[test]
fn test_added_row_is_written_as_pipes() {
    let pristine = parse("| a | b |\n|---|---|\n| 1 | 2 |\n");
    let mut edited = pristine.clone();
    let row = edited.content[0].content[1].clone();
    edited.content[0].content.push(row);
    assert_eq!(
        write(&edited, &pristine),
        "| a | b |\n|---|---|\n| 1 | 2 |\n| 1 | 2 |"
    );
}

#[test]
fn test_spanning_cells_fall_back_to_html() {
    let cell = Node::new(
        NodeKind::TableCell(CellAttrs {
            rowspan: 2,
            ..CellAttrs::default()
        }),
        vec![Node::paragraph(vec![Node::text("tall")])],
    );
    let doc = Document::new(vec![Node::new(
        NodeKind::Table,
        vec![Node::new(NodeKind::TableRow, vec![cell])],
    )]);
    assert_eq!(
        gfm_babel::serialize(&doc, None).unwrap(),
        "<table>\n<tr>\n<td rowspan=\"2\">tall</td>\n</tr>\n</table>"
    );
}
