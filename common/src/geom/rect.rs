/// Inclusive integer rectangle over route node coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub xmin: i32,
    pub xmax: i32,
    pub ymin: i32,
    pub ymax: i32,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingBox {
    pub fn new(xmin: i32, xmax: i32, ymin: i32, ymax: i32) -> Self {
        Self {
            xmin,
            xmax,
            ymin,
            ymax,
        }
    }

    /// A box that contains nothing; the first `include` call defines it.
    pub fn empty() -> Self {
        Self {
            xmin: i32::MAX,
            xmax: i32::MIN,
            ymin: i32::MAX,
            ymax: i32::MIN,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.xmin > self.xmax || self.ymin > self.ymax
    }

    pub fn include(&mut self, x: i32, y: i32) {
        self.xmin = self.xmin.min(x);
        self.xmax = self.xmax.max(x);
        self.ymin = self.ymin.min(y);
        self.ymax = self.ymax.max(y);
    }

    pub fn include_span(&mut self, xlow: i32, xhigh: i32, ylow: i32, yhigh: i32) {
        self.include(xlow, ylow);
        self.include(xhigh, yhigh);
    }

    pub fn expanded(&self, margin: i32) -> Self {
        Self {
            xmin: self.xmin - margin,
            xmax: self.xmax + margin,
            ymin: self.ymin - margin,
            ymax: self.ymax + margin,
        }
    }

    pub fn width(&self) -> i32 {
        self.xmax - self.xmin + 1
    }

    pub fn height(&self) -> i32 {
        self.ymax - self.ymin + 1
    }

    /// Half-perimeter in tiles; a single point counts as 2.
    pub fn half_perimeter(&self) -> i32 {
        if self.is_empty() {
            return 0;
        }
        self.width() + self.height()
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.xmin && x <= self.xmax && y >= self.ymin && y <= self.ymax
    }

    pub fn overlaps_span(&self, xlow: i32, xhigh: i32, ylow: i32, yhigh: i32) -> bool {
        xlow <= self.xmax && xhigh >= self.xmin && ylow <= self.ymax && yhigh >= self.ymin
    }
}
