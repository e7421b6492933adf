#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Append-only storage for simulated ETAS catalogs.
//!
//! A catalog is an ordered sequence of generations, each holding the
//! ruptures spawned by the previous one. [`CatalogBuilder`] owns the
//! rupture storage exclusively and enforces the sequential build protocol
//! `begin_catalog -> (begin_generation -> add_rup* -> end_generation)* ->
//! end_catalog`; any out-of-order call is a programming error and panics.
//!
//! Ruptures live in one contiguous buffer indexed by a per-generation
//! `(offset, len, info)` table, so random access by `(generation, index)`
//! is O(1), appends are amortized O(1), and whole-generation scans walk
//! memory linearly. Queries return copies of the stored values.

use etas_core::{CatalogParams, GenerationInfo, InvariantError, Rupture};

/// Build-protocol states of a [`CatalogBuilder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BuilderState {
    /// No catalog has been started since construction or the last `clear`.
    Empty,
    /// A catalog is open; a generation may be begun or the catalog ended.
    CatalogOpen,
    /// A generation is open and accepting ruptures.
    GenerationOpen,
    /// The catalog is complete and read-only.
    Frozen,
}

#[derive(Clone, Copy, Debug)]
struct GenerationEntry {
    offset: usize,
    len: usize,
    info: GenerationInfo,
}

/// Builder and owner of one catalog at a time.
///
/// A builder is single-owner: only one thread may drive it. After
/// `end_catalog` it stays queryable until [`CatalogBuilder::clear`] resets
/// it for the next catalog, reusing its buffers.
#[derive(Clone, Debug)]
pub struct CatalogBuilder {
    state: BuilderState,
    params: CatalogParams,
    ruptures: Vec<Rupture>,
    generations: Vec<GenerationEntry>,
}

impl Default for CatalogBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: BuilderState::Empty,
            params: CatalogParams::default(),
            ruptures: Vec::new(),
            generations: Vec::new(),
        }
    }

    /// Opens a new catalog with the given parameters.
    ///
    /// The parameters are validated first; a violation is fatal for the
    /// simulation and nothing is stored.
    ///
    /// # Panics
    ///
    /// Panics if a catalog is already open or frozen.
    pub fn begin_catalog(&mut self, params: CatalogParams) -> Result<(), InvariantError> {
        self.expect_state(BuilderState::Empty, "begin_catalog");
        params.validate()?;
        self.params = params;
        self.state = BuilderState::CatalogOpen;
        Ok(())
    }

    /// Opens a catalog and populates the seed generation in one step.
    pub fn begin_seeded(
        &mut self,
        params: CatalogParams,
        seed_info: GenerationInfo,
        seeds: &[Rupture],
    ) -> Result<(), InvariantError> {
        self.begin_catalog(params)?;
        self.begin_generation(seed_info);
        for &seed in seeds {
            self.add_rup(seed);
        }
        self.end_generation();
        Ok(())
    }

    /// Begins the next generation.
    ///
    /// # Panics
    ///
    /// Panics if the catalog is not open, or if a generation is already
    /// open.
    pub fn begin_generation(&mut self, info: GenerationInfo) {
        self.expect_state(BuilderState::CatalogOpen, "begin_generation");
        debug_assert!(
            info.gen_mag_min <= info.gen_mag_max,
            "generation magnitude range is inverted"
        );
        self.generations.push(GenerationEntry {
            offset: self.ruptures.len(),
            len: 0,
            info,
        });
        self.state = BuilderState::GenerationOpen;
    }

    /// Appends a rupture to the open generation.
    ///
    /// # Panics
    ///
    /// Panics if no generation is open.
    pub fn add_rup(&mut self, rup: Rupture) {
        self.expect_state(BuilderState::GenerationOpen, "add_rup");
        self.ruptures.push(rup);
        let entry = self
            .generations
            .last_mut()
            .expect("an open generation has an index entry");
        entry.len += 1;
    }

    /// Closes the open generation.
    ///
    /// # Panics
    ///
    /// Panics if no generation is open.
    pub fn end_generation(&mut self) {
        self.expect_state(BuilderState::GenerationOpen, "end_generation");
        self.state = BuilderState::CatalogOpen;
    }

    /// Freezes the catalog.
    ///
    /// # Panics
    ///
    /// Panics if the catalog is not open, or if it holds no generation.
    pub fn end_catalog(&mut self) {
        self.expect_state(BuilderState::CatalogOpen, "end_catalog");
        assert!(
            !self.generations.is_empty(),
            "catalog builder misuse: end_catalog on a catalog with no generations"
        );
        self.state = BuilderState::Frozen;
    }

    /// Discards all stored data and returns to the empty state, keeping
    /// the allocated buffers for reuse.
    ///
    /// # Panics
    ///
    /// Panics if a catalog is mid-build.
    pub fn clear(&mut self) {
        assert!(
            matches!(self.state, BuilderState::Empty | BuilderState::Frozen),
            "catalog builder misuse: clear during an open catalog"
        );
        self.ruptures.clear();
        self.generations.clear();
        self.state = BuilderState::Empty;
    }

    /// Reports whether the catalog has been frozen by `end_catalog`.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.state == BuilderState::Frozen
    }

    /// Number of generations, including an open one.
    ///
    /// # Panics
    ///
    /// Panics if no catalog has been started.
    #[must_use]
    pub fn gen_count(&self) -> usize {
        self.expect_started("gen_count");
        self.generations.len()
    }

    /// Number of ruptures in a generation.
    ///
    /// For the open generation this is the count appended so far.
    ///
    /// # Panics
    ///
    /// Panics if no catalog has been started or the index is out of range.
    #[must_use]
    pub fn gen_size(&self, gen_index: usize) -> usize {
        self.expect_started("gen_size");
        self.generation(gen_index).len
    }

    /// Magnitude range of a generation.
    ///
    /// # Panics
    ///
    /// Panics if no catalog has been started or the index is out of range.
    #[must_use]
    pub fn gen_info(&self, gen_index: usize) -> GenerationInfo {
        self.expect_started("gen_info");
        self.generation(gen_index).info
    }

    /// Copy of one rupture, addressed by generation and position.
    ///
    /// # Panics
    ///
    /// Panics if no catalog has been started or either index is out of
    /// range.
    #[must_use]
    pub fn rupture(&self, gen_index: usize, rup_index: usize) -> Rupture {
        self.expect_started("rupture");
        let entry = self.generation(gen_index);
        assert!(
            rup_index < entry.len,
            "rupture index {rup_index} out of range for generation {gen_index}"
        );
        self.ruptures[entry.offset + rup_index]
    }

    /// Copy of the catalog parameters.
    ///
    /// # Panics
    ///
    /// Panics if no catalog has been started.
    #[must_use]
    pub fn params(&self) -> CatalogParams {
        self.expect_started("params");
        self.params
    }

    /// Total number of ruptures across all generations.
    ///
    /// # Panics
    ///
    /// Panics if no catalog has been started.
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.expect_started("total_size");
        self.ruptures.len()
    }

    fn generation(&self, gen_index: usize) -> &GenerationEntry {
        assert!(
            gen_index < self.generations.len(),
            "generation index {gen_index} out of range"
        );
        &self.generations[gen_index]
    }

    fn expect_state(&self, required: BuilderState, operation: &str) {
        assert!(
            self.state == required,
            "catalog builder misuse: {operation} in state {:?}",
            self.state
        );
    }

    fn expect_started(&self, operation: &str) {
        assert!(
            self.state != BuilderState::Empty,
            "catalog builder misuse: {operation} before begin_catalog"
        );
    }
}
