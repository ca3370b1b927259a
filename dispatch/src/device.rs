/// 加速器描述。
///
/// 由设备发现过程填写，此后只读。模板校验所需的资源上限全部来自这里。
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Device {
    pub name: String,
    pub vendor: String,
    /// 计算能力 (major, minor)。
    pub compute_capability: (u32, u32),
    pub compute_units: usize,
    /// 每个工作组可用的局部存储字节数。
    pub local_mem_size: usize,
    pub max_work_group_size: usize,
    /// 每个工作项可用的私有存储（寄存器）字节数。
    pub register_budget: usize,
}

impl Device {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    #[inline]
    pub const fn compute_capability(&self) -> (u32, u32) {
        self.compute_capability
    }
}
