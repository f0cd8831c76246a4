/// Fixed-capacity circular queue backing the reorder buffer.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
  buffer: Vec<Option<T>>,
  head: usize, // oldest
  tail: usize, // next free slot
  size: usize,
  capacity: usize,
}

impl<T> RingBuffer<T> {
  pub fn new(capacity: usize) -> Self {
    Self {
      buffer: (0..capacity).map(|_| None).collect(),
      head: 0,
      tail: 0,
      size: 0,
      capacity,
    }
  }

  /// Returns the item back when the buffer is full.
  pub fn push(&mut self, item: T) -> Result<(), T> {
    if self.is_full() {
      return Err(item);
    }
    self.buffer[self.tail] = Some(item);
    self.tail = (self.tail + 1) % self.capacity;
    self.size += 1;
    Ok(())
  }

  pub fn pop(&mut self) -> Option<T> {
    if self.is_empty() {
      return None;
    }
    let item = self.buffer[self.head].take();
    self.head = (self.head + 1) % self.capacity;
    self.size -= 1;
    item
  }

  pub fn peek(&self) -> Option<&T> {
    if self.is_empty() {
      None
    } else {
      self.buffer[self.head].as_ref()
    }
  }

  /// Youngest element.
  pub fn back(&self) -> Option<&T> {
    if self.is_empty() {
      None
    } else {
      self.buffer[(self.tail + self.capacity - 1) % self.capacity].as_ref()
    }
  }

  pub fn find_mut<P>(&mut self, mut pred: P) -> Option<&mut T>
  where
    P: FnMut(&T) -> bool,
  {
    let slot = (0..self.size)
      .map(|i| (self.head + i) % self.capacity)
      .find(|&slot| self.buffer[slot].as_ref().map_or(false, &mut pred))?;
    self.buffer[slot].as_mut()
  }

  pub fn is_empty(&self) -> bool {
    self.size == 0
  }

  pub fn is_full(&self) -> bool {
    self.size == self.capacity
  }

  pub fn len(&self) -> usize {
    self.size
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }
}
