//! # Trigger DDL
//!
//! SQL text for listing, dropping and creating CDC triggers. Identifiers
//! are always double-quoted; everything is built from registry data, never
//! from notification payloads.

use super::spec::TriggerSpec;
use super::InstalledTrigger;

/// Lists distinct CDC triggers. Binds: `$1` schema, `$2` LIKE pattern.
pub const LIST_TRIGGERS: &str = "SELECT DISTINCT trigger_name::text AS name, \
     event_object_table::text AS table_name \
     FROM information_schema.triggers \
     WHERE trigger_schema = $1 AND trigger_name LIKE $2 \
     ORDER BY name";

/// Quote an SQL identifier
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote an SQL string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// LIKE pattern matching every trigger named `<prefix>_...`
pub fn trigger_like_pattern(prefix: &str) -> String {
    let escaped = prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("{}\\_%", escaped)
}

/// Drop installed triggers together with their functions
pub fn drop_functions(schema: &str, installed: &[InstalledTrigger]) -> String {
    installed
        .iter()
        .map(|t| {
            format!(
                "DROP FUNCTION IF EXISTS {}.{} CASCADE;",
                quote_ident(schema),
                quote_ident(&t.name)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// JSON expression for one row image (`NEW` or `OLD`)
fn row_json(alias: &str, columns: Option<&[String]>) -> String {
    match columns {
        None => format!("row_to_json({})", alias),
        Some(columns) => {
            let pairs = columns
                .iter()
                .map(|c| format!("{}, {}.{}", quote_literal(c), alias, quote_ident(c)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("json_build_object({})", pairs)
        }
    }
}

fn envelope(data: &str) -> String {
    format!(
        "json_build_object(\n      'id', gen_random_uuid(),\n      'event', TG_OP,\n      \
         'schema', TG_TABLE_SCHEMA,\n      'table', TG_TABLE_NAME,\n      'data', {}\n    )",
        data
    )
}

/// Function, trigger drop and trigger creation for one spec
pub fn create_trigger(schema: &str, channel: &str, spec: &TriggerSpec) -> String {
    let columns = spec.payload_columns();
    let function = format!("{}.{}", quote_ident(schema), quote_ident(spec.name()));
    let table = format!("{}.{}", quote_ident(schema), quote_ident(spec.table()));
    let events = spec
        .events()
        .iter()
        .map(|e| e.as_str())
        .collect::<Vec<_>>()
        .join(" OR ");

    let delete = envelope(&row_json("OLD", columns));
    let update = envelope(&format!(
        "json_build_object('new', {}, 'old', {})",
        row_json("NEW", columns),
        row_json("OLD", columns)
    ));
    let insert = envelope(&row_json("NEW", columns));

    format!(
        "CREATE OR REPLACE FUNCTION {function}()
RETURNS TRIGGER
AS $BODY$
DECLARE
  payload JSON;
BEGIN
  IF (TG_OP = 'DELETE') THEN
    payload := {delete};
  ELSIF (TG_OP = 'UPDATE') THEN
    payload := {update};
  ELSE
    payload := {insert};
  END IF;
  PERFORM pg_notify({channel}, payload::text);
  RETURN NULL;
END;
$BODY$
LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS {name} ON {table};

CREATE TRIGGER {name}
AFTER {events} ON {table}
FOR EACH ROW EXECUTE FUNCTION {function}();",
        function = function,
        delete = delete,
        update = update,
        insert = insert,
        channel = quote_literal(channel),
        name = quote_ident(spec.name()),
        table = table,
        events = events,
    )
}

/// Creation script for every spec, in order
pub fn render_script<'a>(
    schema: &str,
    channel: &str,
    specs: impl IntoIterator<Item = &'a TriggerSpec>,
) -> String {
    specs
        .into_iter()
        .map(|spec| create_trigger(schema, channel, spec))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::ChangeKind;
    use crate::metadata::EntityMetadata;
    use crate::trigger::Selection;

    fn orders_spec(fields: Selection<String>) -> TriggerSpec {
        let entity = EntityMetadata::new(
            "orders",
            [("id", "id"), ("status", "status"), ("customerId", "customer_id")],
        );
        TriggerSpec::new(
            "pubsub_trigger",
            &entity,
            &Selection::from_items([ChangeKind::Update]),
            &fields,
        )
    }

    #[test]
    fn test_quoting_doubles_embedded_quotes() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal("it's"), "'it''s'");
    }

    #[test]
    fn test_like_pattern_escapes_underscores() {
        assert_eq!(trigger_like_pattern("pubsub_trigger"), "pubsub\\_trigger\\_%");
    }

    #[test]
    fn test_drop_functions_cascades_each_trigger() {
        let sql = drop_functions(
            "public",
            &[
                InstalledTrigger {
                    name: "pubsub_trigger_a".into(),
                    table: "a".into(),
                },
                InstalledTrigger {
                    name: "pubsub_trigger_b".into(),
                    table: "b".into(),
                },
            ],
        );
        assert_eq!(
            sql,
            "DROP FUNCTION IF EXISTS \"public\".\"pubsub_trigger_a\" CASCADE;\n\
             DROP FUNCTION IF EXISTS \"public\".\"pubsub_trigger_b\" CASCADE;"
        );
    }

    #[test]
    fn test_restricted_payload_uses_columns() {
        let spec = orders_spec(Selection::from_items(["status".to_string(), "id".to_string()]));
        let sql = create_trigger("public", "pubsub_trigger", &spec);

        assert!(sql.contains("json_build_object('id', NEW.\"id\", 'status', NEW.\"status\")"));
        assert!(sql.contains("json_build_object('id', OLD.\"id\", 'status', OLD.\"status\")"));
        assert!(!sql.contains("customer_id"));
        assert!(!sql.contains("row_to_json"));
        assert!(sql.contains("AFTER UPDATE ON \"public\".\"orders\""));
        assert!(sql.contains("PERFORM pg_notify('pubsub_trigger', payload::text)"));
        assert!(sql.contains("CREATE OR REPLACE FUNCTION \"public\".\"pubsub_trigger_orders\"()"));
    }

    #[test]
    fn test_unrestricted_payload_uses_full_row() {
        let spec = orders_spec(Selection::All);
        let sql = create_trigger("app", "events", &spec);

        assert!(sql.contains("row_to_json(NEW)"));
        assert!(sql.contains("row_to_json(OLD)"));
        assert!(sql.contains("'new', row_to_json(NEW), 'old', row_to_json(OLD)"));
        assert!(sql.contains("EXECUTE FUNCTION \"app\".\"pubsub_trigger_orders\"()"));
    }
}
