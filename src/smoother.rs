use std::collections::VecDeque;

/// 최근 앵커(x좌표) 이력을 평균 내 프레임 간 흔들림을 줄이는 스무더입니다.
///
/// 이력이 `capacity`에 도달한 상태에서 새 값이 들어오면 가장 오래된 값부터
/// `evict_on_overflow`개를 제거한 뒤 추가합니다. 기본값 1이면 고정 크기 FIFO이고,
/// 3으로 두면 이력 길이가 `capacity - 2`에서 유지됩니다.
#[derive(Debug, Clone)]
pub struct AnchorSmoother {
    history: VecDeque<i32>,
    capacity: usize,
    evict_on_overflow: usize,
    /// 마지막으로 반환한 평균값
    last: Option<i32>,
}

impl AnchorSmoother {
    pub fn new(capacity: usize) -> Self {
        Self::with_eviction(capacity, 1)
    }

    pub fn with_eviction(capacity: usize, evict_on_overflow: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            evict_on_overflow: evict_on_overflow.clamp(1, capacity),
            last: None,
        }
    }

    /// 새 앵커를 이력에 넣고, 이력 전체의 정수 평균을 반환합니다.
    pub fn smooth(&mut self, value: i32) -> i32 {
        if self.history.len() >= self.capacity {
            let evict = self.evict_on_overflow.min(self.history.len());
            self.history.drain(..evict);
        }
        self.history.push_back(value);

        let sum: i64 = self.history.iter().map(|&v| v as i64).sum();
        let mean = (sum / self.history.len() as i64) as i32;
        self.last = Some(mean);
        mean
    }

    /// 직전 `smooth` 호출의 결과. 이력을 건드리지 않습니다.
    pub fn last(&self) -> Option<i32> {
        self.last
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn history(&self) -> impl Iterator<Item = &i32> {
        self.history.iter()
    }
}
