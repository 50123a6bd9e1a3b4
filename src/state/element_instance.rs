use crate::core::{EngineError, Key, NO_KEY, Result};
use crate::db::{ColumnFamilies, ColumnFamily, DbNil, TransactionContext};
use crate::record::{ProcessInstanceIntent, ProcessInstanceRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One activation of a BPMN element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementInstance {
    pub key: Key,
    pub parent_key: Key,
    pub state: ProcessInstanceIntent,
    pub value: ProcessInstanceRecord,
    pub child_count: i32,
    /// Sequence flows taken inside this scope whose target is not activated yet.
    pub active_sequence_flows: i32,
    /// Set when an interrupting event sub-process was triggered in this scope.
    pub interrupted: bool,
    pub job_key: Key,
    pub called_child_instance_key: Key,
}

impl ElementInstance {
    pub fn new(key: Key, state: ProcessInstanceIntent, value: ProcessInstanceRecord) -> Self {
        Self {
            key,
            parent_key: value.flow_scope_key,
            state,
            value,
            child_count: 0,
            active_sequence_flows: 0,
            interrupted: false,
            job_key: NO_KEY,
            called_child_instance_key: NO_KEY,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            ProcessInstanceIntent::ElementActivating | ProcessInstanceIntent::ElementActivated
        )
    }

    pub fn is_terminating(&self) -> bool {
        self.state == ProcessInstanceIntent::ElementTerminating
    }

    pub fn is_completing(&self) -> bool {
        self.state == ProcessInstanceIntent::ElementCompleting
    }

    pub fn can_complete_scope(&self) -> bool {
        self.child_count == 0 && self.active_sequence_flows == 0
    }
}

pub struct ElementInstanceState {
    instances: ColumnFamily<i64, ElementInstance>,
    parent_child: ColumnFamily<(i64, i64), DbNil>,
}

impl ElementInstanceState {
    pub fn new(context: Arc<TransactionContext>) -> Self {
        Self {
            instances: ColumnFamily::new(Arc::clone(&context), ColumnFamilies::ElementInstanceKey),
            parent_child: ColumnFamily::new(context, ColumnFamilies::ElementInstanceParentChild),
        }
    }

    pub fn get_instance(&self, key: Key) -> Result<Option<ElementInstance>> {
        self.instances.get(&key)
    }

    pub fn require_instance(&self, key: Key) -> Result<ElementInstance> {
        self.instances.get(&key)?.ok_or_else(|| {
            EngineError::illegal_state(format!(
                "Expected element instance with key {} to exist, but it does not",
                key
            ))
        })
    }

    /// Stores a new instance and links it below its parent scope.
    pub fn create_instance(&self, instance: &ElementInstance) -> Result<()> {
        self.instances.insert(&instance.key, instance)?;
        if instance.parent_key != NO_KEY {
            self.parent_child.upsert(&(instance.parent_key, instance.key), &DbNil)?;
            if let Some(mut parent) = self.instances.get(&instance.parent_key)? {
                parent.child_count += 1;
                self.instances.update(&parent.key, &parent)?;
            }
        }
        Ok(())
    }

    pub fn update_instance(&self, instance: &ElementInstance) -> Result<()> {
        self.instances.update(&instance.key, instance)
    }

    pub fn update_state(&self, key: Key, state: ProcessInstanceIntent) -> Result<()> {
        let mut instance = self.require_instance(key)?;
        instance.state = state;
        self.instances.update(&key, &instance)
    }

    pub fn remove_instance(&self, key: Key) -> Result<()> {
        let Some(instance) = self.instances.get(&key)? else {
            return Ok(());
        };
        self.instances.delete_existing(&key)?;
        if instance.parent_key != NO_KEY {
            self.parent_child.delete_if_exists(&(instance.parent_key, key))?;
            if let Some(mut parent) = self.instances.get(&instance.parent_key)? {
                parent.child_count = (parent.child_count - 1).max(0);
                self.instances.update(&parent.key, &parent)?;
            }
        }
        Ok(())
    }

    /// Child instances of a scope, in key (creation) order.
    pub fn get_children(&self, parent_key: Key) -> Result<Vec<ElementInstance>> {
        let mut children = Vec::new();
        for ((_, child_key), _) in self.parent_child.entries_with_prefix(&parent_key)? {
            if let Some(child) = self.instances.get(&child_key)? {
                children.push(child);
            }
        }
        Ok(children)
    }

    pub fn increment_active_sequence_flows(&self, scope_key: Key) -> Result<()> {
        let mut scope = self.require_instance(scope_key)?;
        scope.active_sequence_flows += 1;
        self.instances.update(&scope_key, &scope)
    }

    pub fn decrement_active_sequence_flows(&self, scope_key: Key) -> Result<()> {
        let mut scope = self.require_instance(scope_key)?;
        scope.active_sequence_flows = (scope.active_sequence_flows - 1).max(0);
        self.instances.update(&scope_key, &scope)
    }

    pub fn count(&self) -> Result<usize> {
        self.instances.count()
    }

    pub fn all_instances(&self) -> Result<Vec<ElementInstance>> {
        Ok(self.instances.entries()?.into_iter().map(|(_, instance)| instance).collect())
    }

    pub(crate) fn parent_child_index(&self) -> &ColumnFamily<(i64, i64), DbNil> {
        &self.parent_child
    }
}
