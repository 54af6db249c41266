//! Sparse, paginated storage keyed by row index.

const PAGE_SIZE: usize = 512;

struct Page<T> {
    filled: u32,
    slots: Box<[Option<T>]>,
}

impl<T> Page<T> {
    fn new() -> Self {
        Self {
            filled: 0,
            slots: (0..PAGE_SIZE).map(|_| None).collect(),
        }
    }
}

impl<T: Clone> Clone for Page<T> {
    fn clone(&self) -> Self {
        Self {
            filled: self.filled,
            slots: self.slots.clone(),
        }
    }
}

/// A sparse array of `T` with page-granular allocation.
///
/// Rows are `u32` indexes. Pages of 512 slots are allocated on
/// first write and released when their last occupant is removed, so long
/// runs of absent rows cost a single `Option` each.
pub struct PageTable<T> {
    pages: Vec<Option<Page<T>>>,
    len: usize,
}

impl<T> Default for PageTable<T> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<T: Clone> Clone for PageTable<T> {
    fn clone(&self) -> Self {
        Self {
            pages: self.pages.clone(),
            len: self.len,
        }
    }
}

impl<T> std::fmt::Debug for PageTable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageTable")
            .field("len", &self.len)
            .field("pages", &self.pages.len())
            .finish()
    }
}

impl<T> PageTable<T> {
    /// Create a table with room for `capacity` rows before the page vector
    /// has to grow.
    pub fn new(capacity: usize) -> Self {
        let mut pages = Vec::new();
        pages.resize_with(capacity.div_ceil(PAGE_SIZE), || None);
        Self { pages, len: 0 }
    }

    /// Number of occupied rows.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Write `value` at `id`, returning the displaced value if the row was
    /// occupied.
    pub fn insert(&mut self, id: u32, value: T) -> Option<T> {
        let (page, slot) = split(id);
        if page >= self.pages.len() {
            self.pages.resize_with(page + 1, || None);
        }
        let page = self.pages[page].get_or_insert_with(Page::new);
        let old = page.slots[slot].replace(value);
        if old.is_none() {
            page.filled += 1;
            self.len += 1;
        }
        old
    }

    pub fn remove(&mut self, id: u32) -> Option<T> {
        let (page_idx, slot) = split(id);
        let page = self.pages.get_mut(page_idx)?.as_mut()?;
        let old = page.slots[slot].take()?;
        page.filled -= 1;
        self.len -= 1;
        if page.filled == 0 {
            self.pages[page_idx] = None;
        }
        Some(old)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: u32) -> Option<&T> {
        let (page, slot) = split(id);
        self.pages.get(page)?.as_ref()?.slots[slot].as_ref()
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        let (page, slot) = split(id);
        self.pages.get_mut(page)?.as_mut()?.slots[slot].as_mut()
    }

    /// Iterate occupied rows in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.pages.iter().enumerate().flat_map(|(page_idx, page)| {
            page.iter().flat_map(move |page| {
                page.slots.iter().enumerate().filter_map(move |(slot, v)| {
                    v.as_ref().map(|v| (join(page_idx, slot), v))
                })
            })
        })
    }

    /// Iterate occupied rows mutably, in ascending index order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut T)> {
        self.pages
            .iter_mut()
            .enumerate()
            .flat_map(|(page_idx, page)| {
                page.iter_mut().flat_map(move |page| {
                    page.slots
                        .iter_mut()
                        .enumerate()
                        .filter_map(move |(slot, v)| {
                            v.as_mut().map(|v| (join(page_idx, slot), v))
                        })
                })
            })
    }

    pub fn clear(&mut self) {
        self.pages.clear();
        self.len = 0;
    }
}

fn split(id: u32) -> (usize, usize) {
    let id = id as usize;
    (id / PAGE_SIZE, id % PAGE_SIZE)
}

fn join(page: usize, slot: usize) -> u32 {
    (page * PAGE_SIZE + slot) as u32
}
