//! 智能体角色切换的记录：切换前的原角色、目标角色、重试计数与阶段
//!
//! original 为 None 表示当前没有待恢复的切换。切换一旦开始，要么在退出时恢复，要么被显式 reset。

/// 切换阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PersonaPhase {
    Inactive,
    Switching,
    Active,
    Restoring,
}

#[derive(Clone, Debug)]
pub struct PersonaSwitch {
    original: Option<usize>,
    target: usize,
    retries: u32,
    max_retries: u32,
    phase: PersonaPhase,
}

impl PersonaSwitch {
    pub fn new(target: usize, max_retries: u32) -> Self {
        Self {
            original: None,
            target,
            retries: 0,
            max_retries,
            phase: PersonaPhase::Inactive,
        }
    }

    /// 记录原角色，进入 Switching；已有待恢复的原角色时保留旧值。返回待恢复的原角色
    pub fn begin(&mut self, current: usize) -> usize {
        let original = *self.original.get_or_insert(current);
        self.retries = 0;
        self.phase = PersonaPhase::Switching;
        original
    }

    /// 记一次等待；超出上限返回 false
    pub fn record_retry(&mut self) -> bool {
        if self.retries >= self.max_retries {
            return false;
        }
        self.retries += 1;
        true
    }

    pub fn activate(&mut self) {
        self.phase = PersonaPhase::Active;
    }

    /// 取出待恢复的原角色并进入 Restoring；没有待恢复的切换时返回 None
    pub fn begin_restore(&mut self) -> Option<usize> {
        let original = self.original?;
        self.phase = PersonaPhase::Restoring;
        Some(original)
    }

    /// 清除待恢复标记
    pub fn reset(&mut self) {
        self.original = None;
        self.retries = 0;
        self.phase = PersonaPhase::Inactive;
    }

    pub fn original(&self) -> Option<usize> {
        self.original
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn phase(&self) -> PersonaPhase {
        self.phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_lifecycle() {
        let mut switch = PersonaSwitch::new(1, 3);
        assert_eq!(switch.begin_restore(), None);
        assert_eq!(switch.phase(), PersonaPhase::Inactive);

        assert_eq!(switch.begin(0), 0);
        assert_eq!(switch.phase(), PersonaPhase::Switching);
        assert!(switch.record_retry());
        assert!(switch.record_retry());
        assert!(switch.record_retry());
        assert!(!switch.record_retry());
        assert_eq!(switch.retries(), 3);

        switch.activate();
        assert_eq!(switch.begin_restore(), Some(0));
        assert_eq!(switch.phase(), PersonaPhase::Restoring);

        switch.reset();
        assert_eq!(switch.original(), None);
        assert_eq!(switch.phase(), PersonaPhase::Inactive);
    }

    #[test]
    fn test_second_begin_keeps_first_original() {
        let mut switch = PersonaSwitch::new(1, 3);
        assert_eq!(switch.begin(3), 3);
        assert!(switch.record_retry());
        assert_eq!(switch.begin(1), 3);
        assert_eq!(switch.retries(), 0);
        assert_eq!(switch.original(), Some(3));
    }
}
