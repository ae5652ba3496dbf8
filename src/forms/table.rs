//! Forms derived from table descriptors

use super::{FieldKind, FormField, FormSpec};
use crate::schema::{FieldDescriptor, FieldType, TableDescriptor, STATUS_CHOICES};
use crate::value::Record;

fn field_for(descriptor: &FieldDescriptor) -> FormField {
    let kind = match descriptor.field_type {
        FieldType::Text { max_length } => FieldKind::Text {
            max_length: Some(max_length),
        },
        FieldType::Integer => FieldKind::Integer { min_value: None },
        FieldType::Date => FieldKind::Date,
        FieldType::Time => FieldKind::Time,
        FieldType::Status => FieldKind::Choice {
            choices: STATUS_CHOICES.to_vec(),
        },
    };

    let field = FormField::new(descriptor.name, descriptor.label, kind);
    let mut field = if descriptor.nullable { field.optional() } else { field };
    field.initial = descriptor.default.map(|d| d.to_cell().to_csv_field());
    match descriptor.field_type {
        FieldType::Date => field.placeholder("YYYY-MM-DD"),
        FieldType::Time => field.placeholder("hh:mm:ss"),
        _ => field,
    }
}

/// Create form over every editable field of a table
pub fn table_form(table: &TableDescriptor) -> FormSpec {
    FormSpec::new(table.editable_fields().map(field_for).collect())
}

/// Update form pre-populated with the current values of a record
pub fn edit_form(table: &TableDescriptor, record: &Record) -> FormSpec {
    let mut form = table_form(table);
    for field in &mut form.fields {
        if let Some(i) = table.field_index(&field.name) {
            field.initial = Some(record.get(i).to_csv_field());
        }
    }
    form
}
