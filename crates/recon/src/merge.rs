use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use folioscan_core::validate_isin;
use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::assemble::Fragment;
use crate::model::{Field, FieldValue, SecurityRecord, SourceRef};

/// What makes two fragments the same holding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IdentityKey {
    /// Checksum-valid identifier.
    Identifier(String),
    Fingerprint {
        description: Option<String>,
        nominal: Option<OrderedFloat<f64>>,
        currency: Option<String>,
    },
    /// Nothing to match on: the fragment stands alone.
    Orphan(Vec<SourceRef>),
}

impl IdentityKey {
    pub fn of(record: &SecurityRecord) -> Self {
        if let Some(id) = record.identifier.as_deref().filter(|id| validate_isin(id).valid) {
            return Self::Identifier(id.to_string());
        }
        Self::fingerprint(record).unwrap_or_else(|| Self::Orphan(record.source_refs.clone()))
    }

    fn fingerprint(record: &SecurityRecord) -> Option<Self> {
        let description = record.description.as_deref().map(normalize_description);
        let description = description.filter(|d| !d.is_empty());
        let nominal = record.nominal_value.map(OrderedFloat);
        let currency = record.currency.clone();
        if description.is_none() && nominal.is_none() && currency.is_none() {
            return None;
        }
        Some(Self::Fingerprint {
            description,
            nominal,
            currency,
        })
    }
}

/// Upper-case alphanumeric words, single-spaced.
fn normalize_description(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_uppercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// How the sources voted on one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSupport {
    /// Fragments that supplied any value.
    pub sources: usize,
    /// Fragments that supplied the chosen value.
    pub agreeing: usize,
}

impl FieldSupport {
    pub fn disagreeing(&self) -> usize {
        self.sources - self.agreeing
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecord {
    pub record: SecurityRecord,
    pub support: BTreeMap<Field, FieldSupport>,
}

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Merge fragments from every extraction pass into one record per holding.
///
/// The result does not depend on fragment order: groups are keyed, votes are
/// counted, ties are broken by accuracy hint and then by the smallest value,
/// and records come out ordered by their earliest source.
pub fn merge_fragments(fragments: &[Fragment]) -> Vec<MergedRecord> {
    let mut groups: BTreeMap<IdentityKey, Vec<&Fragment>> = BTreeMap::new();
    for fragment in fragments {
        groups
            .entry(IdentityKey::of(&fragment.record))
            .or_default()
            .push(fragment);
    }

    fold_fingerprints_into_identifiers(&mut groups);

    let mut merged: Vec<MergedRecord> = groups.into_values().map(|group| merge_group(&group)).collect();
    merged.sort_by(|a, b| {
        a.record
            .source_refs
            .first()
            .cmp(&b.record.source_refs.first())
            .then_with(|| IdentityKey::of(&a.record).cmp(&IdentityKey::of(&b.record)))
    });
    merged
}

/// A pass that missed the identifier still describes the same holding when
/// its fingerprint matches exactly one identified group.
fn fold_fingerprints_into_identifiers(groups: &mut BTreeMap<IdentityKey, Vec<&Fragment>>) {
    let mut by_fingerprint: BTreeMap<IdentityKey, BTreeSet<IdentityKey>> = BTreeMap::new();
    for (key, group) in groups.iter() {
        if !matches!(key, IdentityKey::Identifier(_)) {
            continue;
        }
        for fragment in group {
            if let Some(fp) = IdentityKey::fingerprint(&fragment.record) {
                by_fingerprint.entry(fp).or_default().insert(key.clone());
            }
        }
    }

    for (fp, owners) in by_fingerprint {
        if owners.len() != 1 {
            continue;
        }
        let Some(owner) = owners.into_iter().next() else {
            continue;
        };
        if let Some(orphans) = groups.remove(&fp) {
            log::debug!("folding {} unidentified fragment(s) into {owner:?}", orphans.len());
            groups.entry(owner).or_default().extend(orphans);
        }
    }
}

fn merge_group(group: &[&Fragment]) -> MergedRecord {
    let mut record = SecurityRecord::default();
    let mut support = BTreeMap::new();

    for field in Field::ALL {
        // value -> (votes, best accuracy among its supporters)
        let mut tally: BTreeMap<FieldValue, (usize, Option<OrderedFloat<f64>>)> = BTreeMap::new();
        for fragment in group {
            if let Some(value) = fragment.record.get(field) {
                let entry = tally.entry(value).or_insert((0, None));
                entry.0 += 1;
                entry.1 = entry.1.max(fragment.accuracy.map(OrderedFloat));
            }
        }
        let sources: usize = tally.values().map(|(n, _)| n).sum();
        let winner = tally
            .into_iter()
            .max_by_key(|(value, (votes, accuracy))| (*votes, *accuracy, Reverse(value.clone())));
        if let Some((value, (agreeing, _))) = winner {
            record.set(field, value);
            support.insert(field, FieldSupport { sources, agreeing });
        }
    }

    let mut refs: Vec<SourceRef> = group
        .iter()
        .flat_map(|f| f.record.source_refs.iter().cloned())
        .collect();
    refs.sort();
    refs.dedup();
    record.source_refs = refs;

    MergedRecord {
        record,
        support,
    }
}
