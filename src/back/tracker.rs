//! The location tracker (spec.md §4.5): per-variable multi-location
//! bookkeeping with permanent/dirty invariants (spec.md §3),
//! register/FPU-stack/stack-slot residency, and Belady-style spill
//! selection. Grounded in the "Public" section of
//! `examples/original_source/gencode.h` (the functions below `backend_t`,
//! which are backend-independent).
//!
//! The tracker never emits assembly itself for pure bookkeeping moves
//! (`update_var_loc`, `discard_var`, `copy_to_var`); where a physical move
//! is unavoidable (`save_var_to_loc`, `flush_loc`, `move_to_reg`/`_mem`,
//! `ensure_unique`) it calls back into the active [`Backend`] exactly once
//! per move, satisfying C4 (those backend hooks themselves must not touch
//! the tracker).

use crate::back::backend::{Backend, RegKind};
use crate::common::*;
use crate::middle::ir::{Function, VarKind};

/// A variable's residence (spec.md §3, "Location").
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Loc {
    Register(u32),
    FpuRegister(u32),
    /// Byte offset from the frame pointer. Carried directly (rather than
    /// as an index into a slot table) so a backend can format it without
    /// needing the tracker's internal state.
    Stack(i32),
    Int(i64),
    Double(FloatBits),
}

impl Loc {
    pub fn is_reg(self) -> bool {
        matches!(self, Loc::Register(_) | Loc::FpuRegister(_))
    }

    pub fn is_const(self) -> bool {
        matches!(self, Loc::Int(_) | Loc::Double(_))
    }

    fn kind(self) -> Option<RegKind> {
        match self {
            Loc::Register(_) => Some(RegKind::Gpr),
            Loc::FpuRegister(_) => Some(RegKind::Fpu),
            _ => None,
        }
    }
}

/// An operand a `COPY` may read from, for [`Tracker::copy_to_var`].
#[derive(Copy, Clone, Debug)]
pub enum Source {
    Var(VarId),
    Int(i64),
    Double(FloatBits),
}

#[derive(Clone, Debug)]
struct LocEntry {
    loc: Loc,
    permanent: bool,
    dirty: bool,
}

#[derive(Clone, Debug, Default)]
struct RegSlot {
    resident: Vec<VarId>,
    denied: bool,
}

pub struct Tracker {
    locs: Map<VarId, Vec<LocEntry>>,
    regs: Vec<RegSlot>,
    fpu: Vec<RegSlot>,
    /// Stack residents keyed by byte offset. Slots are bump-allocated and
    /// never recycled (a deliberate simplification over the original's
    /// free-list allocator, recorded in DESIGN.md).
    stack: Map<i32, Vec<VarId>>,
    next_offset: i32,
    fpu_stack: bool,
}

fn reg_kind_for(kind: VarKind) -> RegKind {
    if kind.is_fp() {
        RegKind::Fpu
    } else {
        RegKind::Gpr
    }
}

impl Tracker {
    pub fn new(reg_num: u32, fpu_reg_num: u32, fpu_stack: bool) -> Self {
        let t = Tracker {
            locs: Map::new(),
            regs: vec![RegSlot::default(); reg_num as usize],
            fpu: vec![RegSlot::default(); fpu_reg_num as usize],
            stack: Map::new(),
            next_offset: 0,
            fpu_stack,
        };
        t.debug_assert_invariants();
        t
    }

    /// Checks the bookkeeping invariants from spec.md §3 (spec.md §8:
    /// "after every tracker operation, the bookkeeping invariant holds").
    /// Called at the top and bottom of every public method below.
    ///
    /// One invariant is intentionally left unchecked here: "a live variable
    /// has at least one non-dirty location" needs liveness information the
    /// tracker itself doesn't carry, so `back::driver` enforces it instead
    /// by always calling `save_live`/`update_permanent_locations` before a
    /// variable goes out of scope. FPU stack-position renumbering also
    /// holds by construction rather than by an explicit check here, since
    /// `rol_fpu`/`ror_fpu` are the only places an FPU index is renumbered
    /// and they do it atomically in a single pass over every location
    /// entry.
    #[cfg(debug_assertions)]
    fn debug_assert_invariants(&self) {
        // Every non-dirty location of v lists v as a resident.
        for (&v, entries) in &self.locs {
            for e in entries {
                if !e.dirty {
                    debug_assert!(
                        self.residents_of(e.loc).contains(&v),
                        "{:?} is a non-dirty location of {:?} but its resident list doesn't contain it",
                        e.loc,
                        v
                    );
                }
                // A constant location never carries the dirty bit.
                debug_assert!(!(e.loc.is_const() && e.dirty), "constant location {:?} of {:?} is dirty", e.loc, v);
            }
        }
        // Every register/FPU-register/stack slot's resident list contains
        // exactly the variables for which it's a non-dirty location.
        let check_bank = |bank: &[RegSlot], mk: &dyn Fn(u32) -> Loc| {
            for (i, slot) in bank.iter().enumerate() {
                for &v in &slot.resident {
                    let loc = mk(i as u32);
                    debug_assert!(
                        self.locs.get(&v).map(|es| es.iter().any(|e| e.loc == loc && !e.dirty)).unwrap_or(false),
                        "{:?} lists {:?} as resident but it has no matching non-dirty location",
                        loc,
                        v
                    );
                }
            }
        };
        check_bank(&self.regs, &Loc::Register);
        check_bank(&self.fpu, &Loc::FpuRegister);
        for (&off, residents) in &self.stack {
            for &v in residents {
                let loc = Loc::Stack(off);
                debug_assert!(
                    self.locs.get(&v).map(|es| es.iter().any(|e| e.loc == loc && !e.dirty)).unwrap_or(false),
                    "stack slot {off} lists {:?} as resident but it has no matching non-dirty location",
                    v
                );
            }
        }
        // A permanent location of v is never also a location (dirty or
        // not) of any other variable.
        for (&v, entries) in &self.locs {
            for e in entries.iter().filter(|e| e.permanent) {
                for (&w, wentries) in &self.locs {
                    if w != v {
                        debug_assert!(
                            !wentries.iter().any(|we| we.loc == e.loc),
                            "permanent location {:?} of {:?} also appears in {:?}'s locations",
                            e.loc,
                            v,
                            w
                        );
                    }
                }
            }
        }
    }

    #[cfg(not(debug_assertions))]
    fn debug_assert_invariants(&self) {}

    fn bank(&self, kind: RegKind) -> &[RegSlot] {
        match kind {
            RegKind::Gpr => &self.regs,
            RegKind::Fpu => &self.fpu,
        }
    }

    fn bank_mut(&mut self, kind: RegKind) -> &mut Vec<RegSlot> {
        match kind {
            RegKind::Gpr => &mut self.regs,
            RegKind::Fpu => &mut self.fpu,
        }
    }

    fn reg_slot(&self, loc: Loc) -> Option<&RegSlot> {
        match loc {
            Loc::Register(r) => self.regs.get(r as usize),
            Loc::FpuRegister(r) => self.fpu.get(r as usize),
            _ => None,
        }
    }

    /// Residents of any kind of location, register/FPU/stack alike.
    fn residents_of(&self, loc: Loc) -> Vec<VarId> {
        match loc {
            Loc::Register(_) | Loc::FpuRegister(_) => self.reg_slot(loc).map(|s| s.resident.clone()).unwrap_or_default(),
            Loc::Stack(off) => self.stack.get(&off).cloned().unwrap_or_default(),
            Loc::Int(_) | Loc::Double(_) => vec![],
        }
    }

    fn add_resident(&mut self, loc: Loc, v: VarId) {
        match loc {
            Loc::Register(r) => self.regs[r as usize].resident.push(v),
            Loc::FpuRegister(r) => self.fpu[r as usize].resident.push(v),
            Loc::Stack(off) => self.stack.entry(off).or_default().push(v),
            Loc::Int(_) | Loc::Double(_) => {}
        }
    }

    fn remove_resident(&mut self, loc: Loc, v: VarId) {
        match loc {
            Loc::Register(r) => self.regs[r as usize].resident.retain(|&r| r != v),
            Loc::FpuRegister(r) => self.fpu[r as usize].resident.retain(|&r| r != v),
            Loc::Stack(off) => {
                if let Some(list) = self.stack.get_mut(&off) {
                    list.retain(|&r| r != v);
                }
            }
            Loc::Int(_) | Loc::Double(_) => {}
        }
    }

    /// Non-dirty locations currently holding `v`.
    pub fn locs_of(&self, v: VarId) -> Vec<Loc> {
        self.debug_assert_invariants();
        let result = self
            .locs
            .get(&v)
            .map(|es| es.iter().filter(|e| !e.dirty).map(|e| e.loc).collect())
            .unwrap_or_default();
        self.debug_assert_invariants();
        result
    }

    pub fn has_loc(&self, v: VarId) -> bool {
        self.debug_assert_invariants();
        let result = !self.locs_of(v).is_empty();
        self.debug_assert_invariants();
        result
    }

    /// spec.md §4.5 `update_var_loc`.
    pub fn update_var_loc(&mut self, v: VarId, loc: Loc) -> bool {
        self.debug_assert_invariants();
        let entries = self.locs.entry(v).or_default();
        let result = if let Some(e) = entries.iter_mut().find(|e| e.loc == loc) {
            let changed = e.dirty;
            e.dirty = false;
            if changed {
                self.add_resident(loc, v);
            }
            changed
        } else {
            entries.push(LocEntry { loc, permanent: false, dirty: false });
            self.add_resident(loc, v);
            true
        };
        self.debug_assert_invariants();
        result
    }

    /// Marks `loc` (already present via `update_var_loc`) as a permanent
    /// location of `v` (used by the x86 backend for parameters and the
    /// return-value slot).
    pub fn make_permanent(&mut self, v: VarId, loc: Loc) {
        self.debug_assert_invariants();
        if let Some(e) = self.locs.entry(v).or_default().iter_mut().find(|e| e.loc == loc) {
            e.permanent = true;
        }
        self.debug_assert_invariants();
    }

    /// Convenience for parameters passed on the stack (spec.md §4.9,
    /// grounded in `stack_param` in `examples/original_source/gencode.h`).
    pub fn stack_param(&mut self, v: VarId, offset: i32) -> Loc {
        self.debug_assert_invariants();
        let loc = Loc::Stack(offset);
        self.update_var_loc(v, loc);
        self.make_permanent(v, loc);
        self.debug_assert_invariants();
        loc
    }

    /// spec.md §4.5 `discard_var`.
    pub fn discard_var(&mut self, v: VarId, backend: &mut dyn Backend) {
        self.debug_assert_invariants();
        let Some(entries) = self.locs.get(&v).cloned() else {
            self.debug_assert_invariants();
            return;
        };
        let mut freed_fpu = vec![];
        let mut next = vec![];
        for mut e in entries {
            if e.permanent {
                if !e.dirty {
                    self.remove_resident(e.loc, v);
                }
                e.dirty = true;
                next.push(e);
            } else {
                self.remove_resident(e.loc, v);
                if let Loc::FpuRegister(r) = e.loc {
                    if self.fpu[r as usize].resident.is_empty() {
                        freed_fpu.push(r);
                    }
                }
            }
        }
        self.locs.insert(v, next);
        for r in freed_fpu {
            backend.fpu_reg_free(r);
        }
        self.debug_assert_invariants();
    }

    /// spec.md §9's noted possibly-buggy `discard_const`: forgets any
    /// constant location of `v` without saving it elsewhere first. The
    /// caller must ensure a live variable is never left without a
    /// location.
    pub fn discard_const(&mut self, v: VarId) {
        self.debug_assert_invariants();
        if let Some(entries) = self.locs.get_mut(&v) {
            entries.retain(|e| !e.loc.is_const());
        }
        self.debug_assert_invariants();
    }

    /// spec.md §4.5 `copy_to_var`: bookkeeping-only, no code emitted.
    pub fn copy_to_var(&mut self, dest: VarId, src: Source, backend: &mut dyn Backend) {
        self.debug_assert_invariants();
        self.discard_var(dest, backend);
        match src {
            Source::Var(s) => {
                let locs = self.locs_of(s);
                for loc in locs {
                    self.locs.entry(dest).or_default().push(LocEntry { loc, permanent: false, dirty: false });
                    self.add_resident(loc, dest);
                }
            }
            Source::Int(i) => {
                self.locs.entry(dest).or_default().push(LocEntry { loc: Loc::Int(i), permanent: false, dirty: false });
            }
            Source::Double(d) => {
                self.locs.entry(dest).or_default().push(LocEntry {
                    loc: Loc::Double(d),
                    permanent: false,
                    dirty: false,
                });
            }
        }
        self.debug_assert_invariants();
    }

    /// Belady-style victim choice (spec.md §4.5): the resident with the
    /// farthest `nearest_use`, preferring one with another non-stack
    /// residence, never a variable in `protect`.
    fn bellady_victim(&self, kind: RegKind, protect: &[VarId], nearest_use: &dyn Fn(VarId) -> u32) -> Option<u32> {
        let bank = self.bank(kind);
        let mut best: Option<(u32, u32, bool)> = None; // (reg, dist, cheap)
        for (i, slot) in bank.iter().enumerate() {
            if slot.denied {
                continue;
            }
            for &v in &slot.resident {
                if protect.contains(&v) && self.locs_of(v).len() == 1 {
                    continue;
                }
                let dist = nearest_use(v);
                let cheap = self.locs_of(v).iter().any(|&l| l != Loc::Register(i as u32) && l != Loc::FpuRegister(i as u32));
                let better = match best {
                    None => true,
                    Some((_, bd, bc)) => (cheap && !bc) || (cheap == bc && dist > bd),
                };
                if better {
                    best = Some((i as u32, dist, cheap));
                }
            }
        }
        best.map(|(r, _, _)| r)
    }

    fn free_reg_indices(&self, kind: RegKind) -> Vec<u32> {
        self.bank(kind)
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.denied && s.resident.is_empty())
            .map(|(i, _)| i as u32)
            .collect()
    }

    pub fn available_regs_num(&self, kind: RegKind) -> u32 {
        self.debug_assert_invariants();
        let result = self.free_reg_indices(kind).len() as u32;
        self.debug_assert_invariants();
        result
    }

    /// The final frame size in bytes, once every stack slot has been
    /// allocated (spec.md §4.9 "deferred frame sizing").
    pub fn frame_bytes(&self) -> u32 {
        self.debug_assert_invariants();
        let result = (-self.next_offset) as u32;
        self.debug_assert_invariants();
        result
    }

    pub fn deny_reg(&mut self, kind: RegKind, idx: u32) {
        self.debug_assert_invariants();
        self.bank_mut(kind)[idx as usize].denied = true;
        self.debug_assert_invariants();
    }

    pub fn allow_reg(&mut self, kind: RegKind, idx: u32) {
        self.debug_assert_invariants();
        self.bank_mut(kind)[idx as usize].denied = false;
        self.debug_assert_invariants();
    }

    /// spec.md §4.5 `flush_loc`: save aside residents that would
    /// otherwise be lost, then clear residency. Does not physically
    /// release an FPU register.
    pub fn flush_loc(&mut self, loc: Loc, func: &Function, backend: &mut dyn Backend) {
        self.debug_assert_invariants();
        let residents = self.residents_of(loc);
        for v in residents {
            if self.locs_of(v).len() == 1 {
                self.save_var_not_to_loc(v, func, 0, Some(loc), backend);
            }
            self.remove_resident(loc, v);
            if let Some(entries) = self.locs.get_mut(&v) {
                entries.retain(|e| e.loc != loc);
            }
        }
        self.debug_assert_invariants();
    }

    fn loc_for_kind(&self, kind: RegKind, idx: u32) -> Loc {
        match kind {
            RegKind::Gpr => Loc::Register(idx),
            RegKind::Fpu => Loc::FpuRegister(idx),
        }
    }

    /// Allocates a free register of `kind`, evicting a Belady victim via
    /// `flush_loc` if none is free (spec.md §4.5 "Belady" strategy).
    pub fn alloc_reg(&mut self, kind: RegKind, func: &Function, protect: &[VarId], nearest_use: &dyn Fn(VarId) -> u32, backend: &mut dyn Backend) -> u32 {
        self.debug_assert_invariants();
        if let Some(&r) = self.free_reg_indices(kind).first() {
            self.debug_assert_invariants();
            return r;
        }
        let victim = self.bellady_victim(kind, protect, nearest_use).expect("no allocatable register: all denied and resident");
        self.flush_loc(self.loc_for_kind(kind, victim), func, backend);
        self.debug_assert_invariants();
        victim
    }

    /// spec.md §4.5 `move_to_reg`.
    pub fn move_to_reg(&mut self, v: VarId, func: &Function, nearest_use: u32, backend: &mut dyn Backend) -> Loc {
        self.debug_assert_invariants();
        let kind = reg_kind_for(func.var(v).kind);
        if let Some(&l) = self.locs_of(v).iter().find(|l| l.kind() == Some(kind)) {
            self.debug_assert_invariants();
            return l;
        }
        let r = self.alloc_reg(kind, func, &[v], &|_| nearest_use, backend);
        let loc = self.loc_for_kind(kind, r);
        let src = self.locs_of(v).first().copied().expect("move_to_reg: v has no location to move from");
        backend.gen_mov(func, loc, src);
        self.update_var_loc(v, loc);
        self.debug_assert_invariants();
        loc
    }

    /// Allocates (or reuses) a stack slot for `v` (spec.md §4.5
    /// `move_to_mem`).
    pub fn move_to_mem(&mut self, v: VarId, func: &Function, backend: &mut dyn Backend) -> Loc {
        self.debug_assert_invariants();
        if let Some(&l) = self.locs_of(v).iter().find(|l| matches!(l, Loc::Stack(_))) {
            self.debug_assert_invariants();
            return l;
        }
        let src = self.locs_of(v).first().copied().expect("move_to_mem: v has no location to move from");
        let size = func.var(v).size.max(backend.int_size());
        self.next_offset -= size as i32;
        let loc = Loc::Stack(self.next_offset);
        backend.gen_mov(func, loc, src);
        self.update_var_loc(v, loc);
        self.debug_assert_invariants();
        loc
    }

    /// spec.md §4.5 `save_var` / `save_var_not_to_loc`: the `4 + n²/2 ≥
    /// d` register-vs-memory heuristic, skipped for FPU-kind variables on
    /// stack-style FPUs (they are never parked in a register here).
    pub fn save_var_not_to_loc(&mut self, v: VarId, func: &Function, nearest_use: u32, forbidden: Option<Loc>, backend: &mut dyn Backend) -> Loc {
        self.debug_assert_invariants();
        if let Some(l) = self.locs_of(v).into_iter().find(|&l| Some(l) != forbidden) {
            self.debug_assert_invariants();
            return l;
        }
        let kind = reg_kind_for(func.var(v).kind);
        if kind == RegKind::Fpu && self.fpu_stack {
            let result = self.move_to_mem(v, func, backend);
            self.debug_assert_invariants();
            return result;
        }
        let n = self.available_regs_num(kind);
        let d = nearest_use;
        let result = if 4 + (n * n) / 2 >= d { self.move_to_reg(v, func, nearest_use, backend) } else { self.move_to_mem(v, func, backend) };
        self.debug_assert_invariants();
        result
    }

    pub fn save_var(&mut self, v: VarId, func: &Function, nearest_use: u32, backend: &mut dyn Backend) -> Loc {
        self.debug_assert_invariants();
        let result = self.save_var_not_to_loc(v, func, nearest_use, None, backend);
        self.debug_assert_invariants();
        result
    }

    /// spec.md §4.5 `save_var_to_loc`.
    pub fn save_var_to_loc(&mut self, v: VarId, loc: Loc, func: &Function, backend: &mut dyn Backend) {
        self.debug_assert_invariants();
        if self.locs_of(v).contains(&loc) {
            self.debug_assert_invariants();
            return;
        }
        let src = self.locs_of(v).first().copied().expect("save_var_to_loc: v has no location to move from");
        self.flush_loc(loc, func, backend);
        backend.gen_mov(func, loc, src);
        self.update_var_loc(v, loc);
        self.debug_assert_invariants();
    }

    /// spec.md §4.5 `update_permanent_locations`.
    pub fn update_permanent_locations(&mut self, v: VarId, func: &Function, backend: &mut dyn Backend) {
        self.debug_assert_invariants();
        let Some(entries) = self.locs.get(&v).cloned() else {
            self.debug_assert_invariants();
            return;
        };
        for e in entries {
            if e.permanent && e.dirty {
                self.save_var_to_loc(v, e.loc, func, backend);
            }
        }
        self.debug_assert_invariants();
    }

    /// spec.md §4.5 `ensure_unique`: collapse to the single location
    /// with the fewest co-residents (ties toward non-stack), evicting
    /// `v` from every other location.
    pub fn ensure_unique(&mut self, v: VarId, func: &Function, backend: &mut dyn Backend) {
        self.debug_assert_invariants();
        let locs = self.locs_of(v);
        if locs.len() <= 1 {
            self.debug_assert_invariants();
            return;
        }
        let best = locs
            .iter()
            .copied()
            .min_by_key(|&l| (self.residents_of(l).len(), matches!(l, Loc::Stack(_))))
            .unwrap();
        for l in locs {
            if l != best {
                self.remove_resident(l, v);
                if let Some(entries) = self.locs.get_mut(&v) {
                    entries.retain(|e| e.loc != l || e.permanent);
                }
                if let Some(entries) = self.locs.get_mut(&v) {
                    for e in entries.iter_mut() {
                        if e.loc == l {
                            e.dirty = true;
                        }
                    }
                }
            }
        }
        let _ = backend;
        self.debug_assert_invariants();
    }

    /// spec.md §4.6 step 5/§4.7: called at the end of a block whose
    /// terminator is a branch, for every variable live across it.
    pub fn save_live(&mut self, func: &Function, live_at_end: &[VarId], backend: &mut dyn Backend) {
        self.debug_assert_invariants();
        for &v in live_at_end {
            self.update_permanent_locations(v, func, backend);
            self.ensure_unique(v, func, backend);
        }
        self.debug_assert_invariants();
    }

    /// Rotates FPU register descriptions left by one: the physical top
    /// becomes index `fpu_reg_num - 1`, everything else shifts down by
    /// one. No code is generated.
    pub fn rol_fpu(&mut self) {
        self.debug_assert_invariants();
        if self.fpu.is_empty() {
            self.debug_assert_invariants();
            return;
        }
        self.fpu.rotate_left(1);
        let n = self.fpu.len() as u32;
        for entries in self.locs.values_mut() {
            for e in entries.iter_mut() {
                if let Loc::FpuRegister(r) = e.loc {
                    e.loc = Loc::FpuRegister((r + n - 1) % n);
                }
            }
        }
        self.debug_assert_invariants();
    }

    /// The inverse of [`Tracker::rol_fpu`].
    pub fn ror_fpu(&mut self) {
        self.debug_assert_invariants();
        if self.fpu.is_empty() {
            self.debug_assert_invariants();
            return;
        }
        self.fpu.rotate_right(1);
        let n = self.fpu.len() as u32;
        for entries in self.locs.values_mut() {
            for e in entries.iter_mut() {
                if let Loc::FpuRegister(r) = e.loc {
                    e.loc = Loc::FpuRegister((r + 1) % n);
                }
            }
        }
        self.debug_assert_invariants();
    }

    /// Loads `v` at the FPU top, rotating the stack down to make room
    /// (spec.md §4.9 "x87-style stack of 8 registers, index 0 is top").
    pub fn fpu_load(&mut self, v: VarId, func: &Function, backend: &mut dyn Backend) {
        self.debug_assert_invariants();
        let src = self.locs_of(v).first().copied().expect("fpu_load: v has no location to load from");
        self.ror_fpu();
        backend.gen_fpu_load(func, v, src);
        self.update_var_loc(v, Loc::FpuRegister(0));
        self.debug_assert_invariants();
    }

    /// Stores the FPU top to `loc` without popping.
    pub fn fpu_store(&mut self, loc: Loc, backend: &mut dyn Backend) {
        self.debug_assert_invariants();
        backend.gen_fpu_store(loc);
        self.debug_assert_invariants();
    }

    /// Pops the FPU stack, discarding whatever is at the top.
    pub fn fpu_pop(&mut self, backend: &mut dyn Backend) {
        self.debug_assert_invariants();
        let was_free = self.fpu[0].resident.is_empty();
        for v in self.fpu[0].resident.clone() {
            self.remove_resident(Loc::FpuRegister(0), v);
            if let Some(entries) = self.locs.get_mut(&v) {
                entries.retain(|e| e.loc != Loc::FpuRegister(0));
            }
        }
        backend.gen_fpu_pop(was_free);
        self.rol_fpu();
        self.debug_assert_invariants();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::back::quadr::QuadrBackend;
    use crate::front::ast::Type;
    use crate::middle::ir::FuncKind;

    fn func() -> Function {
        Function::new(Id::from("f".to_string()), Type::Int, FuncKind::UserDefined)
    }

    #[test]
    fn update_var_loc_is_idempotent() {
        let mut t = Tracker::new(4, 4, true);
        let mut be = QuadrBackend::new();
        let v = VarId(0);
        assert!(t.update_var_loc(v, Loc::Register(0)));
        assert!(!t.update_var_loc(v, Loc::Register(0)));
        assert_eq!(t.locs_of(v), vec![Loc::Register(0)]);
        t.discard_var(v, &mut be);
        assert!(t.locs_of(v).is_empty());
    }

    #[test]
    fn ensure_unique_is_idempotent() {
        let mut t = Tracker::new(4, 4, true);
        let mut be = QuadrBackend::new();
        let f = func();
        let v = VarId(0);
        t.update_var_loc(v, Loc::Register(0));
        t.update_var_loc(v, Loc::Register(1));
        t.ensure_unique(v, &f, &mut be);
        let after_once = t.locs_of(v);
        t.ensure_unique(v, &f, &mut be);
        assert_eq!(after_once, t.locs_of(v));
        assert_eq!(after_once.len(), 1);
    }

    #[test]
    fn rotation_round_trips() {
        let mut t = Tracker::new(0, 4, true);
        let v = VarId(0);
        t.update_var_loc(v, Loc::FpuRegister(0));
        t.ror_fpu();
        t.rol_fpu();
        assert_eq!(t.locs_of(v), vec![Loc::FpuRegister(0)]);
    }

    #[test]
    fn discarding_empties_fpu_register_frees_it_physically() {
        let mut t = Tracker::new(0, 2, true);
        let mut be = QuadrBackend::new();
        let v = VarId(0);
        t.update_var_loc(v, Loc::FpuRegister(0));
        t.discard_var(v, &mut be);
        assert!(t.locs_of(v).is_empty());
    }
}
