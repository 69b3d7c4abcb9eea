//! In-page routines shipped as JavaScript function literals.
//!
//! Each routine is a pure function over one serializable configuration
//! record, returning one serializable report (the shapes live in
//! `surfwright_protocol::page`). Helpers are inlined per routine so every
//! blob is self-contained.

/// Snapshot a scope: bounded text preview plus heading/button/link buckets.
pub const SNAPSHOT: &str = r#"(cfg) => {
	const scope = cfg.selector ? document.querySelector(cfg.selector) : document.body;
	if (!scope) return { scopeMatched: false, textPreview: '', headings: [], buttons: [], links: [],
		truncated: { text: false, headings: false, buttons: false, links: false } };
	const visible = (el) => {
		const rect = el.getBoundingClientRect();
		const style = getComputedStyle(el);
		return rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none';
	};
	const trim = (s) => (s || '').replace(/\s+/g, ' ').trim();
	const pick = (selector, max) => {
		let nodes = Array.from(scope.querySelectorAll(selector));
		if (cfg.visibleOnly) nodes = nodes.filter(visible);
		return { items: nodes.slice(0, max), truncated: nodes.length > max };
	};
	const text = trim(scope.innerText || scope.textContent);
	const headings = pick('h1,h2,h3,h4,h5,h6', cfg.maxHeadings);
	const buttons = pick('button,[role="button"],input[type="submit"],input[type="button"]', cfg.maxButtons);
	const links = pick('a[href]', cfg.maxLinks);
	return {
		scopeMatched: true,
		textPreview: text.slice(0, cfg.maxChars),
		headings: headings.items.map((el) => trim(el.innerText).slice(0, 180)),
		buttons: buttons.items.map((el) => trim(el.innerText || el.value).slice(0, 180)),
		links: links.items.map((el) => ({ text: trim(el.innerText).slice(0, 180), href: el.getAttribute('href') })),
		truncated: {
			text: text.length > cfg.maxChars,
			headings: headings.truncated,
			buttons: buttons.truncated,
			links: links.truncated,
		},
	};
}"#;

/// Locate elements by text, selector, or selector + substring.
pub const FIND: &str = r#"(q) => {
	const visible = (el) => {
		const rect = el.getBoundingClientRect();
		const style = getComputedStyle(el);
		return rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none';
	};
	const trim = (s) => (s || '').replace(/\s+/g, ' ').trim();
	const hint = (el) => {
		let out = el.tagName.toLowerCase();
		if (el.id) out += '#' + el.id;
		out += Array.from(el.classList).slice(0, 2).map((c) => '.' + c).join('');
		return out;
	};
	let nodes;
	if (q.selector) {
		nodes = Array.from(document.querySelectorAll(q.selector));
		if (q.contains) {
			const needle = q.contains.toLowerCase();
			nodes = nodes.filter((el) => trim(el.innerText).toLowerCase().includes(needle));
		}
	} else {
		const needle = (q.text !== undefined && q.text !== null ? q.text : q.contains || '').toLowerCase();
		const clickable = 'a,button,[role="button"],input,select,textarea,summary,[onclick],h1,h2,h3,h4,h5,h6,li,td,th,label,span,div,p';
		nodes = Array.from(document.querySelectorAll(clickable)).filter((el) => {
			const text = trim(el.innerText || el.value).toLowerCase();
			if (!text || !text.includes(needle)) return false;
			// Prefer the innermost matching element.
			return !Array.from(el.children).some((c) => trim(c.innerText).toLowerCase().includes(needle));
		});
	}
	if (q.hrefHost || q.hrefPathPrefix) {
		nodes = nodes.filter((el) => {
			const href = el.getAttribute && el.getAttribute('href');
			if (!href) return false;
			try {
				const u = new URL(href, location.href);
				if (q.hrefHost && u.host !== q.hrefHost) return false;
				if (q.hrefPathPrefix && !u.pathname.startsWith(q.hrefPathPrefix)) return false;
				return true;
			} catch (e) { return false; }
		});
	}
	const annotated = nodes.map((el, index) => ({
		index,
		text: trim(el.innerText || el.value).slice(0, 180),
		visible: visible(el),
		selectorHint: hint(el),
		href: el.getAttribute ? el.getAttribute('href') : null,
	}));
	const kept = q.visibleOnly ? annotated.filter((m) => m.visible) : annotated;
	return { matches: kept.slice(0, q.limit), totalMatched: kept.length, truncated: kept.length > q.limit };
}"#;

/// Click the picked element from a find-equivalent query.
pub const CLICK: &str = r#"(q) => {
	const visible = (el) => {
		const rect = el.getBoundingClientRect();
		const style = getComputedStyle(el);
		return rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none';
	};
	const trim = (s) => (s || '').replace(/\s+/g, ' ').trim();
	let nodes;
	if (q.query.selector) {
		nodes = Array.from(document.querySelectorAll(q.query.selector));
		if (q.query.contains) {
			const needle = q.query.contains.toLowerCase();
			nodes = nodes.filter((el) => trim(el.innerText).toLowerCase().includes(needle));
		}
	} else {
		const needle = (q.query.text !== undefined && q.query.text !== null ? q.query.text : q.query.contains || '').toLowerCase();
		const clickable = 'a,button,[role="button"],input,select,textarea,summary,[onclick],li,td,label,span,div,p';
		nodes = Array.from(document.querySelectorAll(clickable)).filter((el) => {
			const text = trim(el.innerText || el.value).toLowerCase();
			if (!text || !text.includes(needle)) return false;
			return !Array.from(el.children).some((c) => trim(c.innerText).toLowerCase().includes(needle));
		});
	}
	const candidates = q.query.visibleOnly ? nodes.filter(visible) : nodes;
	if (candidates.length === 0) return { clicked: false, pickedIndex: null, matchCount: 0, text: null };
	const index = Math.min(q.nth || 0, candidates.length - 1);
	const el = candidates[index];
	el.scrollIntoView({ block: 'center', inline: 'center' });
	el.click();
	return { clicked: true, pickedIndex: index, matchCount: candidates.length, text: trim(el.innerText || el.value).slice(0, 180) };
}"#;

/// Type into the first element matching the query.
pub const FILL: &str = r#"(q) => {
	const trim = (s) => (s || '').replace(/\s+/g, ' ').trim();
	let nodes;
	if (q.query.selector) {
		nodes = Array.from(document.querySelectorAll(q.query.selector));
	} else {
		const needle = (q.query.text || '').toLowerCase();
		nodes = Array.from(document.querySelectorAll('input,textarea,[contenteditable="true"],select')).filter((el) => {
			const label = trim(el.labels && el.labels[0] ? el.labels[0].innerText : el.placeholder || el.name || '');
			return label.toLowerCase().includes(needle);
		});
	}
	if (nodes.length === 0) return { filled: false, matchCount: 0, valueLength: 0 };
	const el = nodes[0];
	el.focus();
	if (el.isContentEditable) {
		el.textContent = q.value;
	} else {
		// Use the native setter so framework-managed inputs observe the change.
		const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
		const setter = Object.getOwnPropertyDescriptor(proto, 'value');
		if (setter && setter.set) setter.set.call(el, q.value); else el.value = q.value;
	}
	if (q.realisticEvents) {
		el.dispatchEvent(new KeyboardEvent('keydown', { bubbles: true }));
		el.dispatchEvent(new InputEvent('input', { bubbles: true, data: q.value }));
		el.dispatchEvent(new KeyboardEvent('keyup', { bubbles: true }));
		el.dispatchEvent(new Event('change', { bubbles: true }));
	} else {
		el.dispatchEvent(new Event('input', { bubbles: true }));
		el.dispatchEvent(new Event('change', { bubbles: true }));
	}
	return { filled: true, matchCount: nodes.length, valueLength: q.value.length };
}"#;

/// Full text of a scope, whitespace-collapsed by the host afterwards.
pub const TEXT: &str = r#"(cfg) => {
	const scope = cfg.selector ? document.querySelector(cfg.selector) : document.body;
	if (!scope) return { scopeMatched: false, text: '' };
	return { scopeMatched: true, text: scope.innerText || scope.textContent || '' };
}"#;

/// Count elements matching a selector.
pub const COUNT: &str = r#"(cfg) => {
	return { count: document.querySelectorAll(cfg.selector).length };
}"#;

/// Structured extraction; `cfg.kind` selects the heuristic selector set.
pub const EXTRACT: &str = r#"(cfg) => {
	const trim = (s) => (s || '').replace(/\s+/g, ' ').trim();
	const abs = (href) => { try { return new URL(href, location.href).href; } catch (e) { return null; } };
	const records = [];
	const push = (url, title, text, extra) => {
		if (!title && !text && !url) return;
		records.push({ url, title: title || null, text: text || null, extra: extra || null });
	};
	const kind = cfg.kind;
	if (kind === 'headings') {
		document.querySelectorAll('h1,h2,h3,h4,h5,h6').forEach((el) =>
			push(null, trim(el.innerText), null, { level: Number(el.tagName[1]) }));
	} else if (kind === 'links') {
		document.querySelectorAll('a[href]').forEach((el) =>
			push(abs(el.getAttribute('href')), trim(el.innerText), null, null));
	} else if (kind === 'codeblocks' || kind === 'command-lines' || kind === 'docs-commands') {
		document.querySelectorAll('pre, code').forEach((el) => {
			if (el.tagName === 'CODE' && el.closest('pre')) return;
			const text = (el.innerText || '').trim();
			if (!text) return;
			if (kind === 'codeblocks') { push(null, null, text.slice(0, 4000), { language: el.className || null }); return; }
			text.split('\n').map((line) => line.trim()).filter((line) => line).forEach((line) => {
				const cleaned = line.replace(/^[$>#]\s*/, '');
				if (kind === 'command-lines' || /^[a-z][\w.-]*(\s|$)/.test(cleaned)) push(null, null, cleaned, null);
			});
		});
	} else if (kind === 'forms') {
		document.querySelectorAll('form').forEach((form) => {
			const fields = Array.from(form.querySelectorAll('input,select,textarea')).map((el) => ({
				name: el.name || null, type: el.type || el.tagName.toLowerCase(), required: !!el.required,
			}));
			push(abs(form.action || null), trim(form.getAttribute('name') || form.id), null,
				{ method: (form.method || 'get').toUpperCase(), fields: fields.slice(0, 50) });
		});
	} else if (kind === 'tables' || kind === 'table-rows') {
		document.querySelectorAll('table').forEach((table, ti) => {
			const headers = Array.from(table.querySelectorAll('thead th, tr:first-child th')).map((th) => trim(th.innerText));
			if (kind === 'tables') {
				push(null, trim(table.caption ? table.caption.innerText : 'table-' + ti), null,
					{ headers, rows: table.querySelectorAll('tbody tr, tr').length });
			} else {
				table.querySelectorAll('tbody tr').forEach((tr) => {
					const cells = Array.from(tr.querySelectorAll('td')).map((td) => trim(td.innerText));
					if (!cells.length) return;
					const extra = {};
					cells.forEach((cell, i) => { extra[headers[i] || 'col' + i] = cell; });
					push(null, null, null, extra);
				});
			}
		});
	} else {
		// generic | blog | news | docs: article-shaped things with links.
		const selectors = {
			blog: 'article, .post, .blog-post, [class*="post-"]',
			news: 'article, .story, .news-item, [class*="headline"]',
			docs: 'main a[href], nav a[href], .sidebar a[href]',
			generic: 'article, main a[href], h2 a[href], h3 a[href]',
		};
		const picked = selectors[kind] || selectors.generic;
		document.querySelectorAll(picked).forEach((el) => {
			const link = el.tagName === 'A' ? el : el.querySelector('a[href]');
			const heading = el.querySelector ? el.querySelector('h1,h2,h3,h4') : null;
			const title = trim(heading ? heading.innerText : el.innerText).slice(0, 300);
			push(link ? abs(link.getAttribute('href')) : null, title, null, null);
		});
	}
	return records.slice(0, cfg.maxRecords);
}"#;

/// Discoverable feeds for the api-feed fallback.
pub const FEEDS: &str = r#"() => {
	const out = [];
	document.querySelectorAll('link[rel="alternate"]').forEach((el) => {
		const type = (el.getAttribute('type') || '').toLowerCase();
		const href = el.getAttribute('href');
		if (!href) return;
		let kind = null;
		if (type.includes('rss')) kind = 'rss';
		else if (type.includes('atom')) kind = 'atom';
		else if (type.includes('json')) kind = 'api';
		if (!kind) return;
		try { out.push({ url: new URL(href, location.href).href, kind, title: el.getAttribute('title') }); } catch (e) {}
	});
	return out;
}"#;

/// Scroll metrics for scroll planning.
pub const SCROLL_METRICS: &str = r#"() => {
	const el = document.scrollingElement || document.documentElement;
	return { scrollHeight: el.scrollHeight, viewportHeight: window.innerHeight, scrollTop: el.scrollTop };
}"#;

/// Dispatch a keyboard event to a scope (focused element by default).
pub const KEYPRESS: &str = r#"(cfg) => {
	const el = cfg.selector ? document.querySelector(cfg.selector) : (document.activeElement || document.body);
	if (!el) return { dispatched: false };
	const init = { key: cfg.key, bubbles: true, cancelable: true,
		altKey: cfg.modifiers.includes('alt'), ctrlKey: cfg.modifiers.includes('control'),
		metaKey: cfg.modifiers.includes('meta'), shiftKey: cfg.modifiers.includes('shift') };
	el.dispatchEvent(new KeyboardEvent('keydown', init));
	el.dispatchEvent(new KeyboardEvent('keypress', init));
	el.dispatchEvent(new KeyboardEvent('keyup', init));
	return { dispatched: true };
}"#;

/// Select an option in a `<select>` by value, label, or index.
pub const SELECT_OPTION: &str = r#"(cfg) => {
	const el = document.querySelector(cfg.selector);
	if (!el || el.tagName !== 'SELECT') return { selected: false, reason: 'no select element' };
	const options = Array.from(el.options);
	let index = -1;
	if (cfg.value !== undefined && cfg.value !== null) index = options.findIndex((o) => o.value === cfg.value);
	else if (cfg.label !== undefined && cfg.label !== null) index = options.findIndex((o) => o.label.trim() === cfg.label || o.text.trim() === cfg.label);
	else if (cfg.index !== undefined && cfg.index !== null) index = cfg.index < options.length ? cfg.index : -1;
	if (index < 0) return { selected: false, reason: 'option not found' };
	el.selectedIndex = index;
	el.dispatchEvent(new Event('input', { bubbles: true }));
	el.dispatchEvent(new Event('change', { bubbles: true }));
	return { selected: true, value: el.value, label: options[index].text.trim() };
}"#;

/// One-shot page status used by waits and the action epilogue.
pub const PAGE_STATUS: &str = r#"() => {
	return { url: location.href, title: document.title, readyState: document.readyState };
}"#;

/// Console capture installer; reads back from `__surfwrightConsole`.
pub const CONSOLE_INSTALL: &str = r#"() => {
	if (window.__surfwrightConsole) return true;
	window.__surfwrightConsole = [];
	const original = { ...console };
	['log', 'warn', 'error', 'info', 'debug'].forEach((method) => {
		console[method] = (...args) => {
			window.__surfwrightConsole.push({ level: method, text: args.map(String).join(' ').slice(0, 500) });
			original[method](...args);
		};
	});
	return true;
}"#;

pub const CONSOLE_READ: &str = r#"(cfg) => {
	const all = window.__surfwrightConsole || [];
	return { count: all.length, entries: all.slice(-cfg.maxEntries) };
}"#;

#[cfg(test)]
mod tests {
	use super::*;

	/// Every routine must be a function literal the evaluator can apply to
	/// a JSON argument.
	#[test]
	fn routines_are_function_literals() {
		for routine in [
			SNAPSHOT, FIND, CLICK, FILL, TEXT, COUNT, EXTRACT, FEEDS, SCROLL_METRICS, KEYPRESS, SELECT_OPTION,
			PAGE_STATUS, CONSOLE_INSTALL, CONSOLE_READ,
		] {
			let trimmed = routine.trim_start();
			assert!(trimmed.starts_with('(') || trimmed.starts_with("()"), "routine must start with a parameter list");
			assert!(routine.contains("=>"), "routine must be an arrow function");
		}
	}

	#[test]
	fn routines_never_mention_host_types() {
		for routine in [SNAPSHOT, FIND, CLICK, FILL, TEXT, COUNT, EXTRACT] {
			assert!(!routine.contains("surfwright_"), "page scripts stay host-agnostic");
		}
	}
}
