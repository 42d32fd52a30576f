//! Board configuration: adding, editing, removing and reordering stages,
//! and adding priorities.
//!
//! Every operation reads the full list, changes it in memory and saves it
//! back in one write, so a rejected change leaves the stored board as it
//! was.

use crate::board::{sort_stages, Priority, Stage};
use crate::card::nullable;
use crate::error::{DeskError, Result};
use crate::store::RecordStore;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// A stage to add. Without `order` it goes after the current last stage.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewStage {
    pub name: String,
    #[serde(default)]
    pub order: Option<i32>,
    #[serde(default)]
    pub is_visible: Option<bool>,
    #[serde(default)]
    pub yellow_limit: Option<u32>,
    #[serde(default)]
    pub red_limit: Option<u32>,
}

/// Partial stage update. For the limits `Some(None)` clears the threshold.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StagePatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub order: Option<i32>,
    #[serde(default)]
    pub is_visible: Option<bool>,
    #[serde(default, with = "nullable")]
    pub yellow_limit: Option<Option<u32>>,
    #[serde(default, with = "nullable")]
    pub red_limit: Option<Option<u32>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOrder {
    pub id: String,
    pub order: i32,
}

/// A priority to add. Without `order` it ranks after the current last one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPriority {
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub order: Option<i32>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn clean_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DeskError::InvalidBoard("name must not be empty".into()));
    }
    Ok(name.to_string())
}

/// Zero counts as "no threshold", same as `None`.
fn check_limits(yellow: Option<u32>, red: Option<u32>) -> Result<()> {
    match (yellow.filter(|&y| y > 0), red.filter(|&r| r > 0)) {
        (Some(y), Some(r)) if r < y => Err(DeskError::InvalidBoard(format!(
            "red limit ({r} days) is below yellow limit ({y} days)"
        ))),
        _ => Ok(()),
    }
}

fn next_order(orders: impl Iterator<Item = i32>) -> i32 {
    orders.max().unwrap_or(0) + 1
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

pub fn create_stage<S: RecordStore + ?Sized>(store: &S, new: NewStage) -> Result<Stage> {
    let name = clean_name(&new.name)?;
    check_limits(new.yellow_limit, new.red_limit)?;
    let mut stages = store.list_stages()?;
    let order = new
        .order
        .unwrap_or_else(|| next_order(stages.iter().map(|s| s.order)));

    let mut stage = Stage::new(name, order).with_limits(new.yellow_limit, new.red_limit);
    stage.is_visible = new.is_visible.unwrap_or(true);
    stages.push(stage.clone());
    sort_stages(&mut stages);
    store.save_stages(&stages)?;

    tracing::info!(stage_id = %stage.id, name = %stage.name, order, "stage created");
    Ok(stage)
}

pub fn update_stage<S: RecordStore + ?Sized>(store: &S, id: &str, patch: StagePatch) -> Result<Stage> {
    let mut stages = store.list_stages()?;
    let stage = stages
        .iter_mut()
        .find(|s| s.id == id)
        .ok_or_else(|| DeskError::StageNotFound(id.to_string()))?;

    if let Some(name) = &patch.name {
        stage.name = clean_name(name)?;
    }
    if let Some(order) = patch.order {
        stage.order = order;
    }
    if let Some(visible) = patch.is_visible {
        stage.is_visible = visible;
    }
    if let Some(yellow) = patch.yellow_limit {
        stage.yellow_limit = yellow;
    }
    if let Some(red) = patch.red_limit {
        stage.red_limit = red;
    }
    check_limits(stage.yellow_limit, stage.red_limit)?;

    let updated = stage.clone();
    sort_stages(&mut stages);
    store.save_stages(&stages)?;
    tracing::info!(stage_id = %updated.id, "stage updated");
    Ok(updated)
}

/// Remove a stage. Refused while active cards sit in it, and for the last
/// remaining stage. Closed cards keep the dangling id in their history.
pub fn delete_stage<S: RecordStore + ?Sized>(store: &S, id: &str) -> Result<Stage> {
    let mut stages = store.list_stages()?;
    let index = stages
        .iter()
        .position(|s| s.id == id)
        .ok_or_else(|| DeskError::StageNotFound(id.to_string()))?;

    let active = store
        .list_cards()?
        .iter()
        .filter(|c| !c.is_closed && c.stage_id == id)
        .count();
    if active > 0 {
        return Err(DeskError::StageInUse {
            id: id.to_string(),
            active,
        });
    }
    if stages.len() == 1 {
        return Err(DeskError::InvalidBoard("cannot delete the only stage".into()));
    }

    let removed = stages.remove(index);
    store.save_stages(&stages)?;
    tracing::info!(stage_id = %removed.id, name = %removed.name, "stage deleted");
    Ok(removed)
}

/// Assign new orders in one go. Every id must exist; stages not listed
/// keep their order.
pub fn reorder_stages<S: RecordStore + ?Sized>(store: &S, orders: &[StageOrder]) -> Result<Vec<Stage>> {
    let mut stages = store.list_stages()?;
    for entry in orders {
        let stage = stages
            .iter_mut()
            .find(|s| s.id == entry.id)
            .ok_or_else(|| DeskError::StageNotFound(entry.id.clone()))?;
        stage.order = entry.order;
    }
    sort_stages(&mut stages);
    store.save_stages(&stages)?;
    tracing::info!(count = orders.len(), "stages reordered");
    Ok(stages)
}

// ---------------------------------------------------------------------------
// Priorities
// ---------------------------------------------------------------------------

pub fn create_priority<S: RecordStore + ?Sized>(store: &S, new: NewPriority) -> Result<Priority> {
    let name = clean_name(&new.name)?;
    let color = new.color.trim();
    if color.is_empty() {
        return Err(DeskError::InvalidBoard("color must not be empty".into()));
    }
    let mut priorities = store.list_priorities()?;
    let order = new
        .order
        .unwrap_or_else(|| next_order(priorities.iter().map(|p| p.order)));

    let priority = Priority::new(name, color, order);
    priorities.push(priority.clone());
    priorities.sort_by_key(|p| p.order);
    store.save_priorities(&priorities)?;

    tracing::info!(priority_id = %priority.id, name = %priority.name, order, "priority created");
    Ok(priority)
}
