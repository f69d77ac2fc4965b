//! Decorations, decoration groups and execution modes.

use crate::ParseError;
use crate::value::{Value, ValueTable};

/// What part of a value a decoration applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Scope {
    /// The whole value.
    Value,
    /// One member of a struct type.
    Member(u32),
    /// An execution mode of an entry point; `kind` is the mode.
    ExecutionMode,
}

#[derive(Clone, Debug)]
pub(crate) struct Decoration {
    pub scope: Scope,
    /// Raw `spirv::Decoration` or `spirv::ExecutionMode` number.
    pub kind: u32,
    pub literals: Vec<u32>,
    /// Set when this entry stands for every decoration of a group.
    pub group: Option<u32>,
}

impl Decoration {
    pub fn new(scope: Scope, kind: u32, literals: &[u32]) -> Self {
        Self {
            scope,
            kind,
            literals: literals.to_vec(),
            group: None,
        }
    }

    fn from_group(scope: Scope, group: u32) -> Self {
        Self {
            scope,
            kind: 0,
            literals: Vec::new(),
            group: Some(group),
        }
    }

    pub fn literal(&self, index: usize) -> Result<u32, ParseError> {
        self.literals.get(index).copied().ok_or_else(|| {
            crate::malformed(format!("decoration {} is missing literal {index}", self.kind))
        })
    }

    /// Interprets `kind` as a decoration.
    pub fn decoration(&self) -> Result<spirv::Decoration, ParseError> {
        spirv::Decoration::from_u32(self.kind)
            .ok_or_else(|| crate::malformed(format!("unknown decoration {}", self.kind)))
    }
}

/// A decoration after group expansion, with the struct member it targets.
#[derive(Clone, Debug)]
pub(crate) struct Effective {
    pub member: Option<u32>,
    pub decoration: spirv::Decoration,
    pub literals: Vec<u32>,
}

impl Effective {
    pub fn literal(&self, index: usize) -> Result<u32, ParseError> {
        self.literals.get(index).copied().ok_or_else(|| {
            crate::malformed(format!("{:?} is missing literal {index}", self.decoration))
        })
    }
}

impl ValueTable {
    /// Attaches `decoration` to `target`.
    pub fn add_decoration(
        &mut self,
        target: u32,
        decoration: Decoration,
    ) -> Result<(), ParseError> {
        self.slot_mut(target)?.decorations.push(decoration);
        Ok(())
    }

    /// Attaches every decoration of `group` to `target`.
    pub fn add_group(&mut self, target: u32, scope: Scope, group: u32) -> Result<(), ParseError> {
        self.add_decoration(target, Decoration::from_group(scope, group))
    }

    /// Calls `f` once per effective decoration of `id`, expanding groups
    /// depth-first.
    pub fn for_each_decoration(
        &self,
        id: u32,
        f: &mut dyn FnMut(Option<u32>, &Decoration) -> Result<(), ParseError>,
    ) -> Result<(), ParseError> {
        let mut active = vec![id];
        self.expand(id, None, &mut active, f)
    }

    fn expand(
        &self,
        id: u32,
        parent_member: Option<u32>,
        active: &mut Vec<u32>,
        f: &mut dyn FnMut(Option<u32>, &Decoration) -> Result<(), ParseError>,
    ) -> Result<(), ParseError> {
        let Some(slot) = self.slot(id)? else {
            return Ok(());
        };
        for dec in &slot.decorations {
            let member = match dec.scope {
                Scope::Value => parent_member,
                Scope::Member(m) => {
                    if parent_member.is_some() {
                        return Err(crate::malformed(format!(
                            "member decoration of {id} applied to a member"
                        )));
                    }
                    Some(m)
                }
                Scope::ExecutionMode => continue,
            };
            match dec.group {
                Some(group) => {
                    if active.contains(&group) {
                        return Err(ParseError::DecorationGroupCycle(group));
                    }
                    if !matches!(self.get_untyped(group)?, Value::DecorationGroup) {
                        return Err(crate::malformed(format!("{group} is not a decoration group")));
                    }
                    active.push(group);
                    self.expand(group, member, active, f)?;
                    active.pop();
                }
                None => f(member, dec)?,
            }
        }
        Ok(())
    }

    /// Collects the effective decorations of `id`.
    pub fn decorations(&self, id: u32) -> Result<Vec<Effective>, ParseError> {
        let mut out = Vec::new();
        self.for_each_decoration(id, &mut |member, dec| {
            out.push(Effective {
                member,
                decoration: dec.decoration()?,
                literals: dec.literals.clone(),
            });
            Ok(())
        })?;
        Ok(out)
    }

    /// The execution modes attached to an entry point.
    pub fn execution_modes(&self, id: u32) -> Result<Vec<Decoration>, ParseError> {
        Ok(self
            .slot(id)?
            .map(|slot| {
                slot.decorations
                    .iter()
                    .filter(|d| d.scope == Scope::ExecutionMode)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCATION: u32 = spirv::Decoration::Location as u32;
    const FLAT: u32 = spirv::Decoration::Flat as u32;

    #[test]
    fn groups_expand_with_member_index() {
        let mut table = ValueTable::new(8).unwrap();
        table.push(1, Value::DecorationGroup).unwrap();
        table
            .add_decoration(1, Decoration::new(Scope::Value, FLAT, &[]))
            .unwrap();
        table
            .add_decoration(3, Decoration::new(Scope::Value, LOCATION, &[2]))
            .unwrap();
        table.add_group(3, Scope::Member(1), 1).unwrap();

        let decs = table.decorations(3).unwrap();
        assert_eq!(decs.len(), 2);
        assert_eq!(decs[0].decoration, spirv::Decoration::Location);
        assert_eq!(decs[0].member, None);
        assert_eq!(decs[0].literal(0).unwrap(), 2);
        assert_eq!(decs[1].decoration, spirv::Decoration::Flat);
        assert_eq!(decs[1].member, Some(1));
    }

    #[test]
    fn group_cycles_are_fatal() {
        let mut table = ValueTable::new(8).unwrap();
        table.push(1, Value::DecorationGroup).unwrap();
        table.push(2, Value::DecorationGroup).unwrap();
        table.add_group(1, Scope::Value, 2).unwrap();
        table.add_group(2, Scope::Value, 1).unwrap();
        table.add_group(5, Scope::Value, 1).unwrap();
        assert!(matches!(
            table.decorations(5),
            Err(ParseError::DecorationGroupCycle(_))
        ));
    }

    #[test]
    fn execution_modes_are_not_decorations() {
        let mut table = ValueTable::new(8).unwrap();
        table
            .add_decoration(
                4,
                Decoration::new(
                    Scope::ExecutionMode,
                    spirv::ExecutionMode::LocalSize as u32,
                    &[8, 8, 1],
                ),
            )
            .unwrap();
        assert!(table.decorations(4).unwrap().is_empty());
        let modes = table.execution_modes(4).unwrap();
        assert_eq!(modes.len(), 1);
        assert_eq!(modes[0].literals, vec![8, 8, 1]);
    }
}
