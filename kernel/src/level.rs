use std::collections::HashSet;
use std::fmt;

/// Identity of a universe variable introduced during elaboration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LevelMetaId(pub u32);

/// Universe levels
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Level {
    Zero,
    Succ(Box<Level>),
    Max(Box<Level>, Box<Level>),
    Meta(LevelMetaId),
}

impl Level {
    pub fn of(n: u32) -> Level {
        (0..n).fold(Level::Zero, |acc, _| acc.succ())
    }

    pub fn succ(self) -> Level {
        Level::Succ(Box::new(self))
    }

    pub fn max(self, other: Level) -> Level {
        normalize_level(Level::Max(Box::new(self), Box::new(other)))
    }

    /// Closed levels only.
    pub fn to_nat(&self) -> Option<u32> {
        match self {
            Level::Zero => Some(0),
            Level::Succ(inner) => inner.to_nat().map(|n| n + 1),
            Level::Max(a, b) => Some(a.to_nat()?.max(b.to_nat()?)),
            Level::Meta(_) => None,
        }
    }

    pub fn has_metas(&self) -> bool {
        match self {
            Level::Zero => false,
            Level::Succ(inner) => inner.has_metas(),
            Level::Max(a, b) => a.has_metas() || b.has_metas(),
            Level::Meta(_) => true,
        }
    }

    pub fn collect_metas(&self, out: &mut Vec<LevelMetaId>) {
        match self {
            Level::Zero => {}
            Level::Succ(inner) => inner.collect_metas(out),
            Level::Max(a, b) => {
                a.collect_metas(out);
                b.collect_metas(out);
            }
            Level::Meta(id) => {
                if !out.contains(id) {
                    out.push(*id);
                }
            }
        }
    }

    /// Replace every solved universe variable, then normalize.
    pub fn instantiate_metas(&self, lookup: &dyn Fn(LevelMetaId) -> Option<Level>) -> Level {
        fn go(level: &Level, lookup: &dyn Fn(LevelMetaId) -> Option<Level>) -> Level {
            match level {
                Level::Zero => Level::Zero,
                Level::Succ(inner) => Level::Succ(Box::new(go(inner, lookup))),
                Level::Max(a, b) => Level::Max(Box::new(go(a, lookup)), Box::new(go(b, lookup))),
                Level::Meta(id) => match lookup(*id) {
                    Some(solution) => go(&solution, lookup),
                    None => Level::Meta(*id),
                },
            }
        }
        normalize_level(go(self, lookup))
    }

    /// Evaluate under an assignment of universe variables to naturals.
    pub fn evaluate(&self, assign: &dyn Fn(LevelMetaId) -> u32) -> u32 {
        match self {
            Level::Zero => 0,
            Level::Succ(inner) => inner.evaluate(assign) + 1,
            Level::Max(a, b) => a.evaluate(assign).max(b.evaluate(assign)),
            Level::Meta(id) => assign(*id),
        }
    }

    /// Splits `succ^k(l)` into `(l, k)`.
    pub fn peel_succ(&self) -> (&Level, u32) {
        let mut level = self;
        let mut offset = 0;
        while let Level::Succ(inner) = level {
            level = inner;
            offset += 1;
        }
        (level, offset)
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(n) = self.to_nat() {
            return write!(f, "{}", n);
        }
        match self.peel_succ() {
            (base, 0) => match base {
                Level::Max(a, b) => write!(f, "max {} {}", Atom(a), Atom(b)),
                Level::Meta(id) => write!(f, "?u{}", id.0),
                // closed levels were printed above
                Level::Zero | Level::Succ(_) => write!(f, "0"),
            },
            (base, k) => write!(f, "{} + {}", Atom(base), k),
        }
    }
}

struct Atom<'a>(&'a Level);

impl fmt::Display for Atom<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Level::Meta(_) => write!(f, "{}", self.0),
            level if level.to_nat().is_some() => write!(f, "{}", level),
            level => write!(f, "({})", level),
        }
    }
}

fn level_key(level: &Level) -> String {
    match level {
        Level::Zero => "0".to_string(),
        Level::Meta(id) => format!("?{}", id.0),
        Level::Succ(inner) => format!("S({})", level_key(inner)),
        Level::Max(a, b) => format!("M({}, {})", level_key(a), level_key(b)),
    }
}

fn collect_max(level: Level, out: &mut Vec<Level>) {
    match level {
        Level::Max(a, b) => {
            collect_max(*a, out);
            collect_max(*b, out);
        }
        other => out.push(other),
    }
}

fn normalize_max(levels: Vec<Level>) -> Level {
    let mut flat = Vec::new();
    for level in levels {
        collect_max(level, &mut flat);
    }

    flat.retain(|level| !matches!(level, Level::Zero));

    if flat.len() <= 1 {
        return flat.pop().unwrap_or(Level::Zero);
    }

    if flat.iter().all(|level| matches!(level, Level::Succ(_))) {
        let inners: Vec<Level> = flat
            .into_iter()
            .filter_map(|level| match level {
                Level::Succ(inner) => Some(*inner),
                _ => None,
            })
            .collect();
        return Level::Succ(Box::new(normalize_max(inners)));
    }

    let mut seen = HashSet::new();
    flat.retain(|level| seen.insert(level.clone()));
    flat.sort_by_key(level_key);

    let mut iter = flat.into_iter();
    let first = iter.next().unwrap_or(Level::Zero);
    iter.fold(first, |acc, level| Level::Max(Box::new(acc), Box::new(level)))
}

pub fn normalize_level(level: Level) -> Level {
    match level {
        Level::Zero | Level::Meta(_) => level,
        Level::Succ(inner) => Level::Succ(Box::new(normalize_level(*inner))),
        Level::Max(a, b) => {
            let a_norm = normalize_level(*a);
            let b_norm = normalize_level(*b);
            normalize_max(vec![a_norm, b_norm])
        }
    }
}

pub fn level_eq(l1: &Level, l2: &Level) -> bool {
    normalize_level(l1.clone()) == normalize_level(l2.clone())
}

/// Decides `l1 <= l2` when both sides are closed; `None` when universe variables
/// keep the question open.
pub fn level_leq(l1: &Level, l2: &Level) -> Option<bool> {
    if level_eq(l1, l2) || matches!(l1, Level::Zero) {
        return Some(true);
    }
    match (l1.to_nat(), l2.to_nat()) {
        (Some(a), Some(b)) => Some(a <= b),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_of_numerals_collapses() {
        assert_eq!(Level::of(1).max(Level::of(3)), Level::of(3));
        assert_eq!(Level::Zero.max(Level::of(2)), Level::of(2));
    }

    #[test]
    fn max_with_meta_is_kept_symbolic() {
        let meta = Level::Meta(LevelMetaId(0));
        let level = Level::of(1).max(meta.clone());
        assert!(level.has_metas());
        assert_eq!(level.to_string(), "max ?u0 1");
        assert_eq!(level_leq(&Level::Zero, &level), Some(true));
        assert_eq!(level_leq(&Level::of(2), &level), None);
    }

    #[test]
    fn instantiate_resolves_chained_metas() {
        let level = Level::Meta(LevelMetaId(0)).succ();
        let resolved = level.instantiate_metas(&|id| match id.0 {
            0 => Some(Level::Meta(LevelMetaId(1))),
            1 => Some(Level::of(2)),
            _ => None,
        });
        assert_eq!(resolved, Level::of(3));
    }

    #[test]
    fn display_offsets() {
        let level = Level::Meta(LevelMetaId(4)).succ().succ();
        assert_eq!(level.to_string(), "?u4 + 2");
        assert_eq!(Level::of(0).to_string(), "0");
    }
}
