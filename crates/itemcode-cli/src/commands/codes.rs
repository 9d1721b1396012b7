//! Code commands: `issue`, `reconcile`, `lookup`, `codes` and `delete`.

use std::collections::BTreeSet;

use anyhow::{Context, Result, bail};
use itemcode_core::meta::{desired_codes_from_meta, meta_entries};
use itemcode_core::{IdentityCode, ItemId, Reconciler};
use serde::Serialize;

use super::{Invocation, exit_codes, parse_codes, print_json};

/// Issues `quantity` fresh codes to `item_id`.
///
/// Text output lists the codes as the item meta entries they become.
pub fn issue(invocation: &Invocation, item_id: ItemId, quantity: usize) -> Result<u8> {
    let registry = invocation.open_registry()?;
    let report = Reconciler::new(&registry).issue_batch(item_id, quantity);

    if invocation.json {
        print_json(&report)?;
    } else {
        for (key, code) in meta_entries(&report.issued) {
            println!("{key} = {code}");
        }
        for failure in &report.failures {
            eprintln!("Error: {failure}");
        }
    }

    if report.is_complete() {
        Ok(exit_codes::SUCCESS)
    } else {
        Ok(exit_codes::INCOMPLETE)
    }
}

/// Splits `key=value` meta arguments.
fn split_meta(raw: &[String]) -> Result<Vec<(&str, &str)>> {
    raw.iter()
        .map(|entry| {
            entry
                .split_once('=')
                .with_context(|| format!("meta entry '{entry}' is not KEY=VALUE"))
        })
        .collect()
}

/// Makes `item_id` own exactly the given codes.
pub fn reconcile(
    invocation: &Invocation,
    item_id: ItemId,
    codes: &[String],
    meta: &[String],
) -> Result<u8> {
    let mut desired: BTreeSet<IdentityCode> = parse_codes(codes)?.into_iter().collect();
    desired.extend(desired_codes_from_meta(split_meta(meta)?));

    let registry = invocation.open_registry()?;
    let report = Reconciler::new(&registry)
        .reconcile(item_id, &desired)
        .with_context(|| format!("failed to reconcile item {item_id}"))?;

    if invocation.json {
        print_json(&report)?;
    } else {
        for code in &report.deleted {
            println!("- {code}");
        }
        for issued in &report.added {
            println!("+ {}", issued.code);
        }
        for substitution in &report.substituted {
            println!(
                "+ {} (requested {} is owned by another item)",
                substitution.issued.code, substitution.requested
            );
        }
        for (code, err) in &report.failed {
            eprintln!("Error: {code}: {err}");
        }
        println!(
            "{} deleted, {} retained, {} added",
            report.deleted.len(),
            report.retained.len(),
            report.added.len() + report.substituted.len()
        );
    }

    if report.failed.is_empty() {
        Ok(exit_codes::SUCCESS)
    } else {
        Ok(exit_codes::INCOMPLETE)
    }
}

/// Prints the record holding `code`.
pub fn lookup(invocation: &Invocation, code: &str) -> Result<u8> {
    let record = invocation
        .open_registry()?
        .find(code)
        .context("failed to look up code")?;

    let Some(record) = record else {
        if invocation.json {
            print_json(&serde_json::Value::Null)?;
        } else {
            eprintln!("Code '{code}' not found");
        }
        return Ok(exit_codes::NOT_FOUND);
    };

    if invocation.json {
        print_json(&record)?;
    } else {
        println!("Code:           {}", record.code);
        println!("Item:           {}", record.item_id);
        println!("Id:             {}", record.id);
        println!("Verifications:  {}", record.verify_count);
    }
    Ok(exit_codes::SUCCESS)
}

/// Output of `itemcode codes`.
#[derive(Debug, Serialize)]
struct CodesResponse {
    item_id: ItemId,
    codes: BTreeSet<IdentityCode>,
}

/// Lists the codes owned by `item_id`.
pub fn list(invocation: &Invocation, item_id: ItemId) -> Result<u8> {
    let codes = invocation
        .open_registry()?
        .codes_for_item(item_id)
        .with_context(|| format!("failed to list codes of item {item_id}"))?;

    if invocation.json {
        print_json(&CodesResponse { item_id, codes })?;
    } else {
        for code in &codes {
            println!("{code}");
        }
    }
    Ok(exit_codes::SUCCESS)
}

/// Output of `itemcode delete`.
#[derive(Debug, Serialize)]
struct DeleteResponse {
    deleted: usize,
}

/// Deletes the given codes, whoever owns them.
pub fn delete(invocation: &Invocation, codes: &[String]) -> Result<u8> {
    let codes: BTreeSet<IdentityCode> = parse_codes(codes)?.into_iter().collect();
    if codes.is_empty() {
        bail!("no codes given");
    }

    let deleted = invocation
        .open_registry()?
        .delete_codes(&codes)
        .context("failed to delete codes")?;

    if invocation.json {
        print_json(&DeleteResponse { deleted })?;
    } else {
        println!("Deleted {deleted} code(s)");
    }
    Ok(exit_codes::SUCCESS)
}

#[cfg(test)]
mod tests {
    use itemcode_core::{CodeRegistry, SqliteCodeStore};

    use super::*;

    fn invocation(dir: &std::path::Path) -> Invocation {
        Invocation::load(
            &dir.join("itemcode.toml"),
            Some(&dir.join("codes.db")),
            true,
        )
        .unwrap()
    }

    fn registry(dir: &std::path::Path) -> CodeRegistry<SqliteCodeStore> {
        CodeRegistry::new(SqliteCodeStore::open(dir.join("codes.db")).unwrap())
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_issue_persists_codes() {
        let dir = tempfile::tempdir().unwrap();
        let invocation = invocation(dir.path());

        assert_eq!(issue(&invocation, ItemId(42), 3).unwrap(), exit_codes::SUCCESS);
        assert_eq!(registry(dir.path()).codes_for_item(ItemId(42)).unwrap().len(), 3);
    }

    #[test]
    fn test_reconcile_merges_codes_and_meta() {
        let dir = tempfile::tempdir().unwrap();
        let invocation = invocation(dir.path());
        let existing = registry(dir.path()).issue(ItemId(7), None).unwrap();

        let meta = strings(&[
            "pa_size=XL",
            "wpi_product_identity_1=from-meta",
            "wpi_product_identity_2=has space",
        ]);
        let code = reconcile(&invocation, ItemId(7), &strings(&["abc123"]), &meta).unwrap();

        assert_eq!(code, exit_codes::SUCCESS);
        let codes = registry(dir.path()).codes_for_item(ItemId(7)).unwrap();
        let expected: BTreeSet<IdentityCode> = ["abc123", "from-meta"]
            .into_iter()
            .map(|c| IdentityCode::parse(c).unwrap())
            .collect();
        assert_eq!(codes, expected);
        assert_eq!(
            registry(dir.path()).lookup_owner(existing.code.as_str()).unwrap(),
            None
        );
    }

    #[test]
    fn test_reconcile_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let invocation = invocation(dir.path());

        assert!(reconcile(&invocation, ItemId(1), &strings(&["bad code"]), &[]).is_err());
        assert!(reconcile(&invocation, ItemId(1), &[], &strings(&["no-equals"])).is_err());
    }

    #[test]
    fn test_lookup_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let invocation = invocation(dir.path());
        let issued = registry(dir.path()).issue(ItemId(3), None).unwrap();
        let code = issued.code.to_string();

        assert_eq!(lookup(&invocation, &code).unwrap(), exit_codes::SUCCESS);
        assert_eq!(list(&invocation, ItemId(3)).unwrap(), exit_codes::SUCCESS);

        assert_eq!(
            delete(&invocation, &[code.clone(), "nonexistent".to_string()]).unwrap(),
            exit_codes::SUCCESS
        );
        assert_eq!(lookup(&invocation, &code).unwrap(), exit_codes::NOT_FOUND);
    }

    #[test]
    fn test_split_meta() {
        let raw = strings(&["a=b", "key=with=equals"]);
        assert_eq!(
            split_meta(&raw).unwrap(),
            vec![("a", "b"), ("key", "with=equals")]
        );
    }
}
